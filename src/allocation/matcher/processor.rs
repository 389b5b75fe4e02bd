//! Processor dimension

use super::{at_least, bipartite, exact, identity, DimensionMatcher};
use crate::allocation::request::{RequestedProcessor, ResourceRequest};
use crate::domain::{ComputerSystem, Processor};
use crate::store::ResourceGraph;

impl RequestedProcessor {
    pub fn is_satisfied_by(&self, processor: &Processor) -> bool {
        identity(&self.resource, &processor.id)
            && exact(&self.processor_type, &processor.processor_type)
            && exact(&self.instruction_set, &processor.instruction_set)
            && exact(&self.manufacturer, &processor.manufacturer)
            && exact(&self.model, &processor.model)
            && at_least(&self.total_cores, &processor.total_cores)
            && at_least(&self.achievable_speed_mhz, &processor.max_speed_mhz)
            && self
                .capabilities
                .iter()
                .all(|c| processor.capabilities.contains(c))
    }
}

/// Matches requested processors against the system's own processors plus
/// the FPGAs it reaches over PCIe
pub struct ProcessorMatcher;

impl ProcessorMatcher {
    pub fn matches_items(requested: &[RequestedProcessor], available: &[&Processor]) -> bool {
        bipartite::is_fully_matched(requested, available, |r, a| r.is_satisfied_by(a))
    }

    pub fn pool<'a>(system: &'a ComputerSystem, graph: &'a ResourceGraph) -> Vec<&'a Processor> {
        graph
            .processors_of(&system.id)
            .chain(graph.achievable_pcie_processors(system))
            .filter(|p| !p.allocated)
            .collect()
    }
}

impl DimensionMatcher for ProcessorMatcher {
    fn dimension(&self) -> &'static str {
        "processors"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, graph: &ResourceGraph) -> bool {
        if request.processors.is_empty() {
            return true;
        }
        Self::matches_items(&request.processors, &Self::pool(system, graph))
    }
}
