//! Ethernet interface dimension

use super::{at_least, bipartite, identity, DimensionMatcher};
use crate::allocation::request::{RequestedEthernetInterface, ResourceRequest};
use crate::domain::{ComputerSystem, EthernetInterface};
use crate::store::ResourceGraph;

impl RequestedEthernetInterface {
    pub fn is_satisfied_by(&self, interface: &EthernetInterface) -> bool {
        identity(&self.resource, &interface.id)
            && at_least(&self.speed_mbps, &interface.speed_mbps)
            && (!self.requires_vlans() || interface.neighbor_port.is_some())
    }
}

/// Matches requested interfaces, and requires an RDMA-capable interface
/// whenever NVMe-oF remote drives are requested
pub struct EthernetInterfaceMatcher;

impl EthernetInterfaceMatcher {
    pub fn matches_items(
        requested: &[RequestedEthernetInterface],
        available: &[&EthernetInterface],
    ) -> bool {
        bipartite::is_fully_matched(requested, available, |r, a| r.is_satisfied_by(a))
    }
}

impl DimensionMatcher for EthernetInterfaceMatcher {
    fn dimension(&self) -> &'static str {
        "ethernet-interfaces"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, graph: &ResourceGraph) -> bool {
        let available: Vec<&EthernetInterface> = graph.ethernet_interfaces_of(&system.id).collect();

        if request.requests_nvme_over_fabrics() && !available.iter().any(|i| i.supports_rdma()) {
            return false;
        }
        Self::matches_items(&request.ethernet_interfaces, &available)
    }
}
