//! Memory dimension
//!
//! Systems that expose no discrete modules but report an aggregate memory
//! size are matched on capacity alone, and only when no requested item
//! constrains module type, speed, width or manufacturer.

use super::{at_least, bipartite, exact, identity, DimensionMatcher};
use crate::allocation::request::{RequestedMemory, ResourceRequest};
use crate::domain::{ComputerSystem, Memory};
use crate::store::ResourceGraph;

impl RequestedMemory {
    pub fn is_satisfied_by(&self, module: &Memory) -> bool {
        identity(&self.resource, &module.id)
            && exact(&self.memory_device_type, &module.memory_device_type)
            && exact(&self.manufacturer, &module.manufacturer)
            && at_least(&self.speed_mhz, &module.operating_speed_mhz)
            && at_least(&self.data_width_bits, &module.data_width_bits)
            && at_least(&self.capacity_mib, &module.capacity_mib)
    }
}

pub struct MemoryMatcher;

impl MemoryMatcher {
    pub fn matches_items(requested: &[RequestedMemory], available: &[&Memory]) -> bool {
        bipartite::is_fully_matched(requested, available, |r, a| r.is_satisfied_by(a))
    }

    /// Capacity-only comparison against a reported aggregate size
    pub fn matches_total(requested: &[RequestedMemory], total_mib: Option<u64>) -> bool {
        let Some(total_mib) = total_mib else {
            return false;
        };
        if requested
            .iter()
            .any(|r| r.has_module_constraints() || r.resource.is_some())
        {
            return false;
        }
        let wanted = requested
            .iter()
            .filter_map(|r| r.capacity_mib)
            .fold(0u64, u64::saturating_add);
        wanted <= total_mib
    }
}

impl DimensionMatcher for MemoryMatcher {
    fn dimension(&self) -> &'static str {
        "memory"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, graph: &ResourceGraph) -> bool {
        if request.memory.is_empty() {
            return true;
        }
        let modules: Vec<&Memory> = graph.memory_of(&system.id).collect();
        if modules.is_empty() {
            Self::matches_total(&request.memory, system.total_system_memory_mib)
        } else {
            Self::matches_items(&request.memory, &modules)
        }
    }
}
