//! PCIe topology walks
//!
//! A drive or FPGA behind a PCIe switch is reachable ("achievable") from a
//! system when one of the switch's upstream ports carries a cable
//! identifier the system also reports. Every walk here reads the current
//! graph; nothing is memoized, so results always reflect the latest
//! topology.

use super::graph::ResourceGraph;
use crate::domain::{ComputerSystem, Drive, Port, Processor, ResourceId, SystemType};
use std::collections::BTreeSet;

impl ResourceGraph {
    /// Upstream ports of every PCIe switch housed over `chassis`
    pub fn upstream_ports_over_chassis(&self, chassis: &ResourceId) -> Vec<&Port> {
        self.switches_over_chassis(chassis)
            .into_iter()
            .flat_map(|switch| self.ports_of_switch(&switch.id))
            .filter(|port| port.is_upstream())
            .collect()
    }

    /// Whether `system` shares a cable with a switch over `chassis`
    pub fn is_chassis_reachable_from(&self, system: &ComputerSystem, chassis: &ResourceId) -> bool {
        self.upstream_ports_over_chassis(chassis)
            .iter()
            .any(|port| system.shares_connection_with(&port.pcie_connection_ids))
    }

    /// Systems cabled to the switches above `chassis`
    pub fn systems_reachable_over_chassis(&self, chassis: &ResourceId) -> Vec<&ComputerSystem> {
        let ports = self.upstream_ports_over_chassis(chassis);
        self.all::<ComputerSystem>()
            .filter(|system| {
                ports
                    .iter()
                    .any(|port| system.shares_connection_with(&port.pcie_connection_ids))
            })
            .collect()
    }

    /// Systems a local drive serves: NVMe drives through the PCIe switch
    /// topology, other drives through their storage controller.
    pub fn systems_serving_drive(&self, drive: &Drive) -> Vec<&ComputerSystem> {
        if drive.is_nvme() {
            match &drive.chassis {
                Some(chassis) => self.systems_reachable_over_chassis(chassis),
                None => Vec::new(),
            }
        } else {
            self.storage_owner_of(drive).into_iter().collect()
        }
    }

    /// NVMe drives reachable from `system` over PCIe
    pub fn achievable_pcie_drives(&self, system: &ComputerSystem) -> Vec<&Drive> {
        self.all::<Drive>()
            .filter(|drive| drive.is_nvme())
            .filter(|drive| {
                drive
                    .chassis
                    .as_ref()
                    .is_some_and(|chassis| self.is_chassis_reachable_from(system, chassis))
            })
            .collect()
    }

    /// FPGA processors reachable from `system` over PCIe
    pub fn achievable_pcie_processors(&self, system: &ComputerSystem) -> Vec<&Processor> {
        self.all::<Processor>()
            .filter(|processor| processor.is_fpga())
            .filter(|processor| processor.system.as_ref() != Some(&system.id))
            .filter(|processor| {
                processor
                    .chassis
                    .as_ref()
                    .is_some_and(|chassis| self.is_chassis_reachable_from(system, chassis))
            })
            .collect()
    }

    /// Physical systems that reach at least one FPGA exposed by a virtual system
    pub fn physical_systems_reachable_from(&self, virtual_system: &ComputerSystem) -> Vec<&ComputerSystem> {
        let chassis: BTreeSet<&ResourceId> = self
            .processors_of(&virtual_system.id)
            .filter_map(|p| p.chassis.as_ref())
            .chain(virtual_system.chassis.iter())
            .collect();

        self.all::<ComputerSystem>()
            .filter(|system| system.system_type == SystemType::Physical)
            .filter(|system| {
                chassis
                    .iter()
                    .any(|c| self.is_chassis_reachable_from(system, c))
            })
            .collect()
    }

    /// Upstream ports on `fabric` that carry one of the system's cables
    pub fn upstream_ports_for_system(
        &self,
        system: &ComputerSystem,
        fabric: &ResourceId,
    ) -> Vec<ResourceId> {
        self.all::<crate::domain::Switch>()
            .filter(|switch| switch.fabric.as_ref() == Some(fabric))
            .flat_map(|switch| self.ports_of_switch(&switch.id))
            .filter(|port| port.is_upstream())
            .filter(|port| system.shares_connection_with(&port.pcie_connection_ids))
            .map(|port| port.id.clone())
            .collect()
    }
}
