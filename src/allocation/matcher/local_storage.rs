//! Local storage dimension
//!
//! A system's visible local storage is the union of
//! - simple-storage devices attached directly to it,
//! - drives under its own storage controllers,
//! - NVMe drives it reaches over PCIe that are free and not zoned.
//!
//! PCIe drives that were not erased since their last use only match a
//! request that names them explicitly.

use super::{at_least, bipartite, exact, identity, DimensionMatcher};
use crate::allocation::request::{RequestedLocalDrive, ResourceRequest};
use crate::domain::storage::bytes_to_gib;
use crate::domain::{ComputerSystem, Drive, MediaType, Protocol, ResourceId, SimpleStorageDevice};
use crate::store::ResourceGraph;
use serde::Serialize;
use std::collections::BTreeSet;

/// One entry of a system's visible local storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalStorageItem {
    pub id: ResourceId,
    pub capacity_gib: Option<u64>,
    pub media_type: Option<MediaType>,
    pub rpm: Option<u32>,
    pub serial_number: Option<String>,
    pub protocol: Option<Protocol>,
    pub needs_explicit_selection: bool,
}

impl LocalStorageItem {
    fn from_drive(drive: &Drive, needs_explicit_selection: bool) -> Self {
        Self {
            id: drive.id.clone(),
            capacity_gib: drive.capacity_gib(),
            media_type: drive.media_type,
            rpm: drive.rotation_speed_rpm,
            serial_number: drive.serial_number.clone(),
            protocol: drive.protocol,
            needs_explicit_selection,
        }
    }

    fn from_device(owner: &ResourceId, device: &SimpleStorageDevice) -> Self {
        Self {
            id: owner.clone(),
            capacity_gib: device.capacity_bytes.map(bytes_to_gib),
            media_type: None,
            rpm: None,
            serial_number: None,
            protocol: None,
            needs_explicit_selection: false,
        }
    }
}

impl RequestedLocalDrive {
    pub fn is_satisfied_by(&self, item: &LocalStorageItem) -> bool {
        if item.needs_explicit_selection && self.resource.as_ref() != Some(&item.id) {
            return false;
        }
        identity(&self.resource, &item.id)
            && exact(&self.media_type, &item.media_type)
            && exact(&self.serial_number, &item.serial_number)
            && exact(&self.protocol, &item.protocol)
            && at_least(&self.capacity_gib, &item.capacity_gib)
            && at_least(&self.min_rpm, &item.rpm)
    }
}

pub struct LocalStorageMatcher;

impl LocalStorageMatcher {
    pub fn matches_items(requested: &[RequestedLocalDrive], available: &[LocalStorageItem]) -> bool {
        bipartite::is_fully_matched(requested, available, |r, a| r.is_satisfied_by(a))
    }

    /// Materialize the local storage `system` can see right now
    pub fn visible_pool(system: &ComputerSystem, graph: &ResourceGraph) -> Vec<LocalStorageItem> {
        let mut items = Vec::new();

        for simple in graph.simple_storages_of(&system.id) {
            items.extend(
                simple
                    .devices
                    .iter()
                    .filter(|d| d.status.is_enabled_and_healthy())
                    .map(|d| LocalStorageItem::from_device(&simple.id, d)),
            );
        }

        let mut seen = BTreeSet::new();
        for storage in graph.storages_of(&system.id) {
            for drive in graph.drives_of_storage(&storage.id) {
                if drive.allocated || !drive.status.is_available() {
                    continue;
                }
                if seen.insert(drive.id.clone()) {
                    items.push(LocalStorageItem::from_drive(drive, false));
                }
            }
        }

        for drive in graph.achievable_pcie_drives(system) {
            if drive.allocated || !drive.status.is_available() {
                continue;
            }
            if graph.endpoints_linking(&drive.id).any(|e| e.is_in_use()) {
                continue;
            }
            if seen.insert(drive.id.clone()) {
                items.push(LocalStorageItem::from_drive(drive, !drive.drive_erased));
            }
        }

        items
    }
}

impl DimensionMatcher for LocalStorageMatcher {
    fn dimension(&self) -> &'static str {
        "local-storage"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, graph: &ResourceGraph) -> bool {
        if request.local_drives.is_empty() {
            return true;
        }
        Self::matches_items(&request.local_drives, &Self::visible_pool(system, graph))
    }
}
