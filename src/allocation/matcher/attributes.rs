//! Aggregate system attributes: total core count and total memory

use super::{at_least, DimensionMatcher};
use crate::allocation::request::ResourceRequest;
use crate::domain::ComputerSystem;
use crate::store::ResourceGraph;

pub struct SystemAttributesMatcher;

impl SystemAttributesMatcher {
    /// Cores summed over the system's own processors
    pub fn total_cores(system: &ComputerSystem, graph: &ResourceGraph) -> Option<u32> {
        let mut cores = graph
            .processors_of(&system.id)
            .filter_map(|p| p.total_cores)
            .peekable();
        cores.peek()?;
        Some(cores.fold(0u32, u32::saturating_add))
    }

    /// Reported aggregate memory, else the sum of module capacities
    pub fn total_memory_mib(system: &ComputerSystem, graph: &ResourceGraph) -> Option<u64> {
        if system.total_system_memory_mib.is_some() {
            return system.total_system_memory_mib;
        }
        let mut modules = graph
            .memory_of(&system.id)
            .filter_map(|m| m.capacity_mib)
            .peekable();
        modules.peek()?;
        Some(modules.fold(0u64, u64::saturating_add))
    }
}

impl DimensionMatcher for SystemAttributesMatcher {
    fn dimension(&self) -> &'static str {
        "system-attributes"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, graph: &ResourceGraph) -> bool {
        at_least(
            &request.total_system_core_count,
            &Self::total_cores(system, graph),
        ) && at_least(
            &request.total_system_memory_mib,
            &Self::total_memory_mib(system, graph),
        )
    }
}
