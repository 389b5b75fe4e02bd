//! Compute-side entities: systems, their processors, memory, network
//! interfaces and security modules, and the chassis that house them.

use super::types::{
    InstructionSet, MemoryDeviceType, ProcessorType, Protocol, ResourceId, Status, SystemType,
    TpmInterfaceType, TransportProtocol,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Computer System
// =============================================================================

/// A physical or virtual compute system that a composed node binds to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputerSystem {
    pub id: ResourceId,
    pub name: Option<String>,
    pub uuid: Option<Uuid>,
    pub system_type: SystemType,
    pub status: Status,
    /// Already bound to a composed node
    pub allocated: bool,
    /// Chassis the system is mounted in
    pub chassis: Vec<ResourceId>,
    /// Cable identifiers shared with PCIe switch upstream ports
    pub pcie_connection_ids: Vec<String>,
    /// Reported aggregate memory, used when no modules are exposed
    pub total_system_memory_mib: Option<u64>,
    pub txt_enabled: Option<bool>,
    pub trusted_modules: Vec<TrustedModule>,
}

impl ComputerSystem {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Enabled, healthy, and not yet bound to a node
    pub fn is_available_for_allocation(&self) -> bool {
        self.status.is_enabled_and_healthy() && !self.allocated
    }

    pub fn is_virtual(&self) -> bool {
        self.system_type == SystemType::Virtual
    }

    pub fn shares_connection_with(&self, connection_ids: &[String]) -> bool {
        self.pcie_connection_ids
            .iter()
            .any(|id| connection_ids.contains(id))
    }
}

/// A TPM or TCM module reported by a system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedModule {
    pub interface_type: Option<TpmInterfaceType>,
    pub firmware_version: Option<String>,
    pub status: Status,
}

impl TrustedModule {
    pub fn of_type(interface_type: TpmInterfaceType) -> Self {
        Self {
            interface_type: Some(interface_type),
            ..Default::default()
        }
    }
}

// =============================================================================
// Processor
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Processor {
    pub id: ResourceId,
    /// Owning system, absent for pooled FPGAs behind a PCIe switch
    pub system: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
    pub processor_type: Option<ProcessorType>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub instruction_set: Option<InstructionSet>,
    pub total_cores: Option<u32>,
    pub max_speed_mhz: Option<u32>,
    pub capabilities: Vec<String>,
    /// Attach protocol, set for fabric-attached accelerators
    pub protocol: Option<Protocol>,
    pub status: Status,
    pub allocated: bool,
    pub composed_node: Option<ResourceId>,
}

impl Processor {
    pub fn is_fpga(&self) -> bool {
        self.processor_type == Some(ProcessorType::Fpga)
    }
}

// =============================================================================
// Memory
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Memory {
    pub id: ResourceId,
    pub system: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
    pub memory_device_type: Option<MemoryDeviceType>,
    pub operating_speed_mhz: Option<u32>,
    pub data_width_bits: Option<u32>,
    pub capacity_mib: Option<u64>,
    pub manufacturer: Option<String>,
    pub status: Status,
}

// =============================================================================
// Ethernet Interface
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthernetInterface {
    pub id: ResourceId,
    pub system: Option<ResourceId>,
    pub chassis: Option<ResourceId>,
    pub speed_mbps: Option<u32>,
    pub mac_address: Option<String>,
    pub supported_protocols: Vec<TransportProtocol>,
    /// Switch port this interface is cabled to, if known
    pub neighbor_port: Option<ResourceId>,
    pub status: Status,
}

impl EthernetInterface {
    pub fn supports_rdma(&self) -> bool {
        self.supported_protocols.iter().any(|p| p.is_rdma())
    }
}

// =============================================================================
// Chassis
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chassis {
    pub id: ResourceId,
    pub name: Option<String>,
    pub chassis_type: Option<String>,
    pub contained_by: Option<ResourceId>,
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_availability() {
        let mut system = ComputerSystem::new("/redfish/v1/Systems/1");
        assert!(system.is_available_for_allocation());

        system.allocated = true;
        assert!(!system.is_available_for_allocation());
    }

    #[test]
    fn test_shared_connection() {
        let mut system = ComputerSystem::new("/redfish/v1/Systems/1");
        system.pcie_connection_ids = vec!["cable-1".into()];

        assert!(system.shares_connection_with(&["cable-0".into(), "cable-1".into()]));
        assert!(!system.shares_connection_with(&["cable-2".into()]));
        assert!(!system.shares_connection_with(&[]));
    }
}
