//! Storage-side entities: simple storage, storage controllers, drives and
//! fabric volumes.

use super::types::{MediaType, Protocol, ResourceId, Status};
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Simple storage subsystem with directly attached devices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleStorage {
    pub id: ResourceId,
    pub system: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
    pub devices: Vec<SimpleStorageDevice>,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleStorageDevice {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub capacity_bytes: Option<u64>,
    pub status: Status,
}

/// Storage controller grouping drives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub id: ResourceId,
    pub system: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drive {
    pub id: ResourceId,
    pub name: Option<String>,
    pub chassis: Option<ResourceId>,
    pub storage: Option<ResourceId>,
    pub protocol: Option<Protocol>,
    pub media_type: Option<MediaType>,
    pub capacity_bytes: Option<u64>,
    pub rotation_speed_rpm: Option<u32>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Securely erased since its last use
    pub drive_erased: bool,
    pub status: Status,
    pub allocated: bool,
    pub composed_node: Option<ResourceId>,
}

impl Drive {
    pub fn is_nvme(&self) -> bool {
        self.protocol == Some(Protocol::Nvme)
    }

    pub fn capacity_gib(&self) -> Option<u64> {
        self.capacity_bytes.map(|b| b / BYTES_PER_GIB)
    }
}

/// Fabric-exported volume provided by a storage service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub id: ResourceId,
    pub capacity_bytes: Option<u64>,
    pub fabric: Option<ResourceId>,
    pub status: Status,
    pub allocated: bool,
    pub composed_node: Option<ResourceId>,
}

pub(crate) fn bytes_to_gib(bytes: u64) -> u64 {
    bytes / BYTES_PER_GIB
}
