//! Remote Attach Coordinator
//!
//! Resolves the initiator endpoint, the target endpoint and the zone for
//! one attach against the fabric manager. Nothing local is written here.
//! Every creation is preceded by a reuse check against the local snapshot
//! and followed, on an "already exists" rejection, by a query for the
//! existing object, so re-running the coordinator never creates
//! duplicates.

use super::context::{AttachOperationContext, Resolution, ResolvedAttachment, ResolvedId};
use super::lookup::EndpointLookup;
use super::strategy::{AttachStrategy, TargetEndpointMode};
use crate::domain::{ComposedNode, ComputerSystem, Endpoint, EntityResolver, ResourceId, Zone};
use crate::error::{Error, Result};
use crate::fabric::FabricServices;
use crate::store::ResourceGraph;
use tracing::{debug, info};

pub struct RemoteAttachCoordinator {
    fabric: FabricServices,
}

impl RemoteAttachCoordinator {
    pub fn new(fabric: FabricServices) -> Self {
        Self { fabric }
    }

    /// Resolve every fabric object the attach needs
    pub async fn resolve(
        &self,
        graph: &ResourceGraph,
        context: AttachOperationContext,
        strategy: &AttachStrategy,
    ) -> Result<ResolvedAttachment> {
        let initiator_endpoint = self.resolve_initiator_endpoint(graph, &context).await?;
        let target_endpoint = self
            .resolve_target_endpoint(graph, &context, strategy)
            .await?;
        let zone = self
            .resolve_zone(&context, &initiator_endpoint.id, &target_endpoint.id)
            .await?;

        Ok(ResolvedAttachment {
            context,
            initiator_endpoint,
            target_endpoint,
            zone,
        })
    }

    // =========================================================================
    // Initiator
    // =========================================================================

    pub async fn resolve_initiator_endpoint(
        &self,
        graph: &ResourceGraph,
        context: &AttachOperationContext,
    ) -> Result<ResolvedId> {
        let system = graph.resolve::<ComputerSystem>(&context.system)?;

        if let Some(existing) = existing_initiator(graph, context, system) {
            info!(
                "Reusing initiator endpoint {} of system {} on {}",
                existing, system.id, context.fabric
            );
            return Ok(ResolvedId::new(existing, Resolution::Reused));
        }

        let system_uuid = context
            .system_uuid
            .ok_or_else(|| Error::state_mismatch(&system.id, "Computer system has no UUID"))?;
        let ports = if context.protocol.is_pcie_class() {
            graph.upstream_ports_for_system(system, &context.fabric)
        } else {
            Vec::new()
        };

        let endpoints = &self.fabric.endpoints;
        match endpoints
            .create_initiator_endpoint(&context.fabric, context.protocol, system_uuid, &ports)
            .await
        {
            Ok(id) => {
                info!(
                    "Created initiator endpoint {} for system {} on {}",
                    id, system.id, context.fabric
                );
                Ok(ResolvedId::new(id, Resolution::Created))
            }
            Err(e) if e.is_remote_conflict() => {
                debug!("Initiator creation rejected: {}", e);
                let id = endpoints
                    .initiator_endpoint_by_system_uuid(&context.fabric, system_uuid)
                    .await?;
                info!(
                    "Recovered existing initiator endpoint {} for system {}",
                    id, system.id
                );
                Ok(ResolvedId::new(id, Resolution::Recovered))
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Target
    // =========================================================================

    /// Target endpoint exposing the asset on its fabric
    pub async fn resolve_target_endpoint(
        &self,
        graph: &ResourceGraph,
        context: &AttachOperationContext,
        strategy: &AttachStrategy,
    ) -> Result<ResolvedId> {
        if strategy.target_endpoint == TargetEndpointMode::AssetIsEndpoint {
            return Ok(ResolvedId::new(context.asset.clone(), Resolution::Reused));
        }

        let existing: Vec<&Endpoint> = graph
            .endpoints_linking(&context.asset)
            .filter(|e| e.is_on_fabric(&context.fabric))
            .collect();
        if let [endpoint] = existing.as_slice() {
            info!(
                "Reusing target endpoint {} of {}",
                endpoint.id, context.asset
            );
            return Ok(ResolvedId::new(endpoint.id.clone(), Resolution::Reused));
        }

        let endpoints = &self.fabric.endpoints;
        match endpoints
            .create_target_endpoint(&context.fabric, context.protocol, &context.asset)
            .await
        {
            Ok(id) => {
                info!("Created target endpoint {} for {}", id, context.asset);
                Ok(ResolvedId::new(id, Resolution::Created))
            }
            Err(e) if e.is_remote_conflict() => {
                debug!("Target creation rejected: {}", e);
                let id = endpoints
                    .target_endpoint_by_related_asset(&context.fabric, &context.asset)
                    .await?;
                info!(
                    "Recovered existing target endpoint {} for {}",
                    id, context.asset
                );
                Ok(ResolvedId::new(id, Resolution::Recovered))
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Zone
    // =========================================================================

    /// Add the target to the initiator's zone, or zone the pair
    pub async fn resolve_zone(
        &self,
        context: &AttachOperationContext,
        initiator: &ResourceId,
        target: &ResourceId,
    ) -> Result<ResolvedId> {
        let zones = &self.fabric.zones;

        if let Some(zone) = zones.zone_for_endpoint(&context.fabric, initiator).await? {
            self.add_to_zone(&zone, target).await?;
            info!("Reusing zone {} of initiator {}", zone.id, initiator);
            return Ok(ResolvedId::new(zone.id, Resolution::Reused));
        }

        match zones.create_zone(&context.fabric, initiator, target).await {
            Ok(id) => {
                info!("Created zone {} for {} and {}", id, initiator, target);
                Ok(ResolvedId::new(id, Resolution::Created))
            }
            Err(e) if e.is_remote_conflict() => {
                debug!("Zone creation rejected: {}", e);
                let zone = match zones.zone_for_endpoint(&context.fabric, initiator).await? {
                    Some(zone) => zone,
                    None => return Err(e),
                };
                self.add_to_zone(&zone, target).await?;
                info!("Recovered existing zone {} of {}", zone.id, initiator);
                Ok(ResolvedId::new(zone.id, Resolution::Recovered))
            }
            Err(e) => Err(e),
        }
    }

    async fn add_to_zone(&self, zone: &Zone, target: &ResourceId) -> Result<()> {
        if zone.contains(target) {
            return Ok(());
        }
        self.fabric.zones.update_zone(&zone.id, target).await?;
        debug!("Added {} to zone {}", target, zone.id);
        Ok(())
    }
}

/// Initiator already acting for the node's system on the context fabric.
///
/// PCIe-class fabrics expose initiators only through the zones of drives
/// already wired to the node; other fabrics link them to the system.
fn existing_initiator(
    graph: &ResourceGraph,
    context: &AttachOperationContext,
    system: &ComputerSystem,
) -> Option<ResourceId> {
    if !context.protocol.is_pcie_class() {
        return EndpointLookup::initiator_for_system(graph, system, &context.fabric)
            .ok()
            .map(|e| e.id.clone());
    }

    let node = graph.get::<ComposedNode>(&context.node)?;
    node.drives
        .iter()
        .flat_map(|drive| graph.endpoints_linking(drive))
        .filter_map(|endpoint| endpoint.zone.as_ref())
        .filter_map(|zone| graph.get::<Zone>(zone))
        .flat_map(|zone| zone.endpoints.iter())
        .filter_map(|member| graph.get::<Endpoint>(member))
        .find(|e| e.is_initiator() && e.is_on_fabric(&context.fabric))
        .map(|e| e.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::strategy::{AssetKind, AttachStrategyRegistry};
    use crate::domain::{ConnectedEntity, EntityRole, Identifier, Protocol};
    use crate::fabric::{FabricOperation, InMemoryFabricManager};
    use crate::store::topology::fixtures::pcie_pod;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use uuid::Uuid;

    const NVME_FABRIC: &str = "/fabrics/nvme";

    fn coordinator(manager: &Arc<InMemoryFabricManager>) -> RemoteAttachCoordinator {
        RemoteAttachCoordinator::new(FabricServices::from_adapter(manager.clone()))
    }

    fn context(asset: &str, fabric: &str, protocol: Protocol) -> AttachOperationContext {
        AttachOperationContext {
            kind: AssetKind::Drive,
            fabric: fabric.into(),
            protocol,
            node: "/nodes/1".into(),
            asset: asset.into(),
            system: "/systems/1".into(),
            system_uuid: Some(Uuid::from_u128(1)),
        }
    }

    fn pod() -> ResourceGraph {
        let mut graph = pcie_pod();
        let mut node = ComposedNode::new("/nodes/1");
        node.system = Some("/systems/1".into());
        graph.insert(node);
        graph
    }

    fn drive_strategy() -> &'static AttachStrategy {
        AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap()
    }

    #[tokio::test]
    async fn test_target_resolution_is_idempotent() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let coordinator = coordinator(&manager);
        let ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);

        let first = coordinator
            .resolve_target_endpoint(&graph, &ctx, drive_strategy())
            .await
            .unwrap();
        // Same stale snapshot: creation is rejected and the existing one found
        let second = coordinator
            .resolve_target_endpoint(&graph, &ctx, drive_strategy())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.resolution, Resolution::Created);
        assert_eq!(second.resolution, Resolution::Recovered);
        assert_eq!(manager.endpoints_created().await, 1);
    }

    #[tokio::test]
    async fn test_target_reused_from_snapshot() {
        let mut graph = pod();
        graph.insert(Endpoint {
            id: "/fabrics/nvme/Endpoints/t1".into(),
            fabric: Some(NVME_FABRIC.into()),
            connected_entities: vec![ConnectedEntity {
                entity_role: EntityRole::Target,
                entity: Some("/remote/drives/1".into()),
            }],
            ..Default::default()
        });
        let manager = Arc::new(InMemoryFabricManager::from_graph(&graph));
        let ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);

        let target = coordinator(&manager)
            .resolve_target_endpoint(&graph, &ctx, drive_strategy())
            .await
            .unwrap();
        assert_eq!(target.id.as_str(), "/fabrics/nvme/Endpoints/t1");
        assert_eq!(target.resolution, Resolution::Reused);
        assert_eq!(manager.endpoints_created().await, 0);
    }

    #[tokio::test]
    async fn test_endpoint_asset_is_its_own_target() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Endpoint).unwrap();
        let ctx = context("/fabrics/nvme/Endpoints/t9", NVME_FABRIC, Protocol::NvmeOverFabrics);

        let target = coordinator(&manager)
            .resolve_target_endpoint(&graph, &ctx, strategy)
            .await
            .unwrap();
        assert_eq!(target.id, ctx.asset);
        assert_eq!(manager.endpoints_created().await, 0);
    }

    #[tokio::test]
    async fn test_initiator_recovered_after_conflict() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let coordinator = coordinator(&manager);
        let ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);

        let first = coordinator.resolve_initiator_endpoint(&graph, &ctx).await.unwrap();
        let second = coordinator.resolve_initiator_endpoint(&graph, &ctx).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.resolution, Resolution::Recovered);
        assert_eq!(manager.endpoints_created().await, 1);

        let endpoint = manager.endpoint(&first.id).await.unwrap();
        assert_eq!(
            endpoint.identifiers,
            vec![Identifier::for_uuid(Protocol::NvmeOverFabrics, Uuid::from_u128(1))]
        );
        assert!(endpoint.ports.is_empty());
    }

    #[tokio::test]
    async fn test_pcie_initiator_carries_upstream_ports() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let ctx = context("/chassis/drawer/drives/1", "/fabrics/pcie", Protocol::Nvme);

        let initiator = coordinator(&manager)
            .resolve_initiator_endpoint(&graph, &ctx)
            .await
            .unwrap();
        let endpoint = manager.endpoint(&initiator.id).await.unwrap();
        assert_eq!(
            endpoint.ports,
            vec![ResourceId::from("/fabrics/pcie/switches/1/ports/up1")]
        );
    }

    #[tokio::test]
    async fn test_pcie_initiator_found_through_node_drives() {
        let mut graph = pod();
        let mut node = ComposedNode::new("/nodes/1");
        node.system = Some("/systems/1".into());
        node.drives.insert("/chassis/drawer/drives/1".into());
        graph.insert(node);
        graph.insert(Endpoint {
            id: "/fabrics/pcie/Endpoints/i1".into(),
            fabric: Some("/fabrics/pcie".into()),
            connected_entities: vec![ConnectedEntity {
                entity_role: EntityRole::Initiator,
                entity: None,
            }],
            zone: Some("/fabrics/pcie/Zones/1".into()),
            ..Default::default()
        });
        graph.insert(Endpoint {
            id: "/fabrics/pcie/Endpoints/t1".into(),
            fabric: Some("/fabrics/pcie".into()),
            connected_entities: vec![ConnectedEntity {
                entity_role: EntityRole::Target,
                entity: Some("/chassis/drawer/drives/1".into()),
            }],
            zone: Some("/fabrics/pcie/Zones/1".into()),
            ..Default::default()
        });
        graph.insert(Zone {
            id: "/fabrics/pcie/Zones/1".into(),
            fabric: Some("/fabrics/pcie".into()),
            endpoints: vec![
                "/fabrics/pcie/Endpoints/i1".into(),
                "/fabrics/pcie/Endpoints/t1".into(),
            ],
            ..Default::default()
        });
        let manager = Arc::new(InMemoryFabricManager::from_graph(&graph));
        let ctx = context("/chassis/drawer/drives/2", "/fabrics/pcie", Protocol::Nvme);

        let resolved = coordinator(&manager)
            .resolve(&graph, ctx, drive_strategy())
            .await
            .unwrap();

        assert_eq!(resolved.initiator_endpoint.id.as_str(), "/fabrics/pcie/Endpoints/i1");
        assert_eq!(resolved.initiator_endpoint.resolution, Resolution::Reused);
        // Zone reused: count unchanged, one more member
        assert_eq!(resolved.zone.id.as_str(), "/fabrics/pcie/Zones/1");
        assert_eq!(resolved.zone.resolution, Resolution::Reused);
        assert_eq!(manager.zone_count().await, 1);
        let zone = manager.zone(&resolved.zone.id).await.unwrap();
        assert_eq!(zone.endpoints.len(), 3);
        assert!(zone.contains(&resolved.target_endpoint.id));
    }

    #[tokio::test]
    async fn test_new_zone_holds_exactly_the_pair() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);

        let resolved = coordinator(&manager)
            .resolve(&graph, ctx, drive_strategy())
            .await
            .unwrap();

        assert_eq!(resolved.zone.resolution, Resolution::Created);
        assert_eq!(manager.zones_created().await, 1);
        let zone = manager.zone(&resolved.zone.id).await.unwrap();
        assert_eq!(
            zone.endpoints,
            vec![
                resolved.initiator_endpoint.id.clone(),
                resolved.target_endpoint.id.clone()
            ]
        );
    }

    #[tokio::test]
    async fn test_rerun_after_remote_failure_creates_nothing_twice() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let coordinator = coordinator(&manager);
        let ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);

        manager.fail_next(FabricOperation::CreateZone, 1).await;
        assert_matches!(
            coordinator.resolve(&graph, ctx.clone(), drive_strategy()).await,
            Err(Error::RemoteOperation { .. })
        );

        let resolved = coordinator
            .resolve(&graph, ctx, drive_strategy())
            .await
            .unwrap();
        assert_eq!(resolved.initiator_endpoint.resolution, Resolution::Recovered);
        assert_eq!(resolved.target_endpoint.resolution, Resolution::Recovered);
        assert_eq!(resolved.zone.resolution, Resolution::Created);
        assert_eq!(manager.endpoints_created().await, 2);
        assert_eq!(manager.zones_created().await, 1);
    }

    #[tokio::test]
    async fn test_initiator_requires_system_uuid() {
        let graph = pod();
        let manager = Arc::new(InMemoryFabricManager::new());
        let mut ctx = context("/remote/drives/1", NVME_FABRIC, Protocol::NvmeOverFabrics);
        ctx.system_uuid = None;

        assert_matches!(
            coordinator(&manager).resolve_initiator_endpoint(&graph, &ctx).await,
            Err(Error::StateMismatch { .. })
        );
    }
}
