//! Resource Requests
//!
//! The shape of a node composition request. Every requested item carries
//! exact-match fields (types, manufacturers, serials, explicit resource
//! references) and threshold fields ("at least" capacities and speeds).
//! An absent field is a wildcard.

use crate::domain::{
    InstructionSet, MediaType, MemoryDeviceType, ProcessorType, Protocol, ResourceId,
    TpmInterfaceType,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Requested Items
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedProcessor {
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub processor_type: Option<ProcessorType>,
    pub instruction_set: Option<InstructionSet>,
    /// At least this many cores
    pub total_cores: Option<u32>,
    /// At least this clock speed
    pub achievable_speed_mhz: Option<u32>,
    /// All of these capabilities
    pub capabilities: Vec<String>,
    pub resource: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedMemory {
    pub memory_device_type: Option<MemoryDeviceType>,
    pub manufacturer: Option<String>,
    pub speed_mhz: Option<u32>,
    pub data_width_bits: Option<u32>,
    pub capacity_mib: Option<u64>,
    pub resource: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
}

impl RequestedMemory {
    /// Constrains anything beyond capacity
    pub fn has_module_constraints(&self) -> bool {
        self.memory_device_type.is_some()
            || self.manufacturer.is_some()
            || self.speed_mhz.is_some()
            || self.data_width_bits.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedLocalDrive {
    pub capacity_gib: Option<u64>,
    pub media_type: Option<MediaType>,
    pub min_rpm: Option<u32>,
    pub serial_number: Option<String>,
    pub protocol: Option<Protocol>,
    pub resource: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedRemoteDrive {
    pub capacity_gib: Option<u64>,
    pub protocol: Option<Protocol>,
    /// Volume to clone from
    pub master: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedVlan {
    pub vlan_id: u32,
    #[serde(default)]
    pub tagged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedEthernetInterface {
    pub speed_mbps: Option<u32>,
    pub primary_vlan: Option<u32>,
    pub vlans: Vec<RequestedVlan>,
    pub resource: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
}

impl RequestedEthernetInterface {
    pub fn requires_vlans(&self) -> bool {
        self.primary_vlan.is_some() || !self.vlans.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedSecurity {
    pub tpm_present: Option<bool>,
    pub tpm_interface_type: Option<TpmInterfaceType>,
    pub txt_enabled: Option<bool>,
}

// =============================================================================
// Resource Request
// =============================================================================

/// A request to compose one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    pub name: Option<String>,
    pub processors: Vec<RequestedProcessor>,
    pub memory: Vec<RequestedMemory>,
    pub local_drives: Vec<RequestedLocalDrive>,
    pub remote_drives: Vec<RequestedRemoteDrive>,
    pub ethernet_interfaces: Vec<RequestedEthernetInterface>,
    pub security: Option<RequestedSecurity>,
    /// At least this many cores across the system
    pub total_system_core_count: Option<u32>,
    /// At least this much memory across the system
    pub total_system_memory_mib: Option<u64>,
}

impl ResourceRequest {
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Explicit resource references in processors, memory and network
    /// interfaces; local drive references are resolved separately
    pub fn component_references(&self) -> Vec<&ResourceId> {
        self.processors
            .iter()
            .filter_map(|p| p.resource.as_ref())
            .chain(self.memory.iter().filter_map(|m| m.resource.as_ref()))
            .chain(
                self.ethernet_interfaces
                    .iter()
                    .filter_map(|e| e.resource.as_ref()),
            )
            .collect()
    }

    pub fn local_drive_references(&self) -> Vec<&ResourceId> {
        self.local_drives
            .iter()
            .filter_map(|d| d.resource.as_ref())
            .collect()
    }

    /// Chassis referenced by processors, memory and network interfaces
    pub fn component_chassis_references(&self) -> Vec<&ResourceId> {
        let mut chassis: Vec<&ResourceId> = self
            .processors
            .iter()
            .filter_map(|p| p.chassis.as_ref())
            .chain(self.memory.iter().filter_map(|m| m.chassis.as_ref()))
            .chain(
                self.ethernet_interfaces
                    .iter()
                    .filter_map(|e| e.chassis.as_ref()),
            )
            .collect();
        chassis.sort();
        chassis.dedup();
        chassis
    }

    pub fn local_drive_chassis_references(&self) -> Vec<&ResourceId> {
        let mut chassis: Vec<&ResourceId> = self
            .local_drives
            .iter()
            .filter_map(|d| d.chassis.as_ref())
            .collect();
        chassis.sort();
        chassis.dedup();
        chassis
    }

    pub fn has_resource_references(&self) -> bool {
        !self.component_references().is_empty() || !self.local_drive_references().is_empty()
    }

    pub fn has_chassis_references(&self) -> bool {
        !self.component_chassis_references().is_empty()
            || !self.local_drive_chassis_references().is_empty()
    }

    /// Explicitly referenced FPGA processors
    pub fn requested_fpga_references(&self) -> Vec<&ResourceId> {
        self.processors
            .iter()
            .filter(|p| p.processor_type == Some(ProcessorType::Fpga))
            .filter_map(|p| p.resource.as_ref())
            .collect()
    }

    pub fn requests_nvme_over_fabrics(&self) -> bool {
        self.remote_drives
            .iter()
            .any(|d| d.protocol == Some(Protocol::NvmeOverFabrics))
    }
}
