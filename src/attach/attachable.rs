//! Assets a composed node could attach right now

use super::strategy::AssetKind;
use crate::domain::{
    ComposedNode, ComputerSystem, Endpoint, EntityResolver, Fabric, Processor, Protocol,
    ResourceId, Volume,
};
use crate::error::{Error, Result};
use crate::store::ResourceGraph;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachableAsset {
    pub id: ResourceId,
    pub kind: AssetKind,
    pub protocol: Option<Protocol>,
}

pub struct AttachableAssets;

impl AttachableAssets {
    /// Drives, volumes, FPGAs and target endpoints free for `node`'s system
    pub fn list(graph: &ResourceGraph, node: &ResourceId) -> Result<Vec<AttachableAsset>> {
        let node = graph.resolve::<ComposedNode>(node)?;
        let system_id = node
            .system
            .as_ref()
            .ok_or_else(|| Error::state_mismatch(&node.id, "Composed node has no computer system"))?;
        let system = graph.resolve::<ComputerSystem>(system_id)?;

        let mut assets = Vec::new();

        assets.extend(
            graph
                .achievable_pcie_drives(system)
                .into_iter()
                .filter(|d| !d.allocated && d.status.is_enabled_and_healthy())
                .map(|d| AttachableAsset {
                    id: d.id.clone(),
                    kind: AssetKind::Drive,
                    protocol: d.protocol,
                }),
        );

        assets.extend(
            graph
                .all::<Volume>()
                .filter(|v| v.status.is_enabled_and_healthy() && !v.allocated && v.fabric.is_some())
                .map(|v| AttachableAsset {
                    id: v.id.clone(),
                    kind: AssetKind::Volume,
                    protocol: v
                        .fabric
                        .as_ref()
                        .and_then(|f| graph.get::<Fabric>(f))
                        .and_then(|f| f.protocol),
                }),
        );

        let mut seen = BTreeSet::new();
        let over_fabrics = graph
            .all::<Processor>()
            .filter(|p| p.is_fpga() && p.protocol == Some(Protocol::FpgaOverFabrics));
        for processor in graph
            .achievable_pcie_processors(system)
            .into_iter()
            .chain(over_fabrics)
            .filter(|p| !p.allocated)
        {
            if seen.insert(&processor.id) {
                assets.push(AttachableAsset {
                    id: processor.id.clone(),
                    kind: AssetKind::Processor,
                    protocol: processor.protocol,
                });
            }
        }

        assets.extend(
            graph
                .all::<Endpoint>()
                .filter(|e| {
                    e.is_target()
                        && e.linked_entities().next().is_some()
                        && !e.is_in_use()
                        && e.protocol != Some(Protocol::Iscsi)
                })
                .map(|e| AttachableAsset {
                    id: e.id.clone(),
                    kind: AssetKind::Endpoint,
                    protocol: e.protocol,
                }),
        );

        Ok(assets)
    }
}
