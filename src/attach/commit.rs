//! Local Attach Committer
//!
//! Pulls the fabric manager's view of the resolved endpoints and zone into
//! the local store and links everything to the node, all inside one fresh
//! transaction. A transaction that loses a race with a concurrent writer is
//! re-executed from scratch, up to the configured number of attempts.

use super::context::ResolvedAttachment;
use super::retry::retry_on_conflict;
use super::strategy::{AssetKind, AttachStrategy};
use crate::domain::{ComposedNode, Drive, Endpoint, Processor, ResourceId, Volume};
use crate::error::Result;
use crate::fabric::FabricServices;
use crate::metrics::ComposerMetrics;
use crate::store::{ResourceStore, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

pub struct LocalAttachCommitter {
    store: Arc<ResourceStore>,
    fabric: FabricServices,
    attempts: u32,
    metrics: Option<Arc<ComposerMetrics>>,
}

impl LocalAttachCommitter {
    pub fn new(store: Arc<ResourceStore>, fabric: FabricServices, attempts: u32) -> Self {
        Self {
            store,
            fabric,
            attempts,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ComposerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Commit a resolved attachment, returning the updated node
    pub async fn commit(
        &self,
        resolved: &ResolvedAttachment,
        strategy: &AttachStrategy,
    ) -> Result<ComposedNode> {
        retry_on_conflict(self.attempts, move |attempt| {
            self.commit_once(resolved, strategy, attempt)
        })
        .await
    }

    async fn commit_once(
        &self,
        resolved: &ResolvedAttachment,
        strategy: &AttachStrategy,
        attempt: u32,
    ) -> Result<ComposedNode> {
        if attempt > 1 {
            if let Some(metrics) = &self.metrics {
                metrics.record_commit_retry();
            }
        }
        let context = &resolved.context;
        let initiator = &resolved.initiator_endpoint.id;
        let target = &resolved.target_endpoint.id;
        let zone = &resolved.zone.id;

        let mut tx = self.store.begin();

        let discovered = self
            .fabric
            .endpoints
            .discover_endpoint(&context.fabric, target)
            .await?;
        merge_endpoint(&mut tx, discovered, zone);
        let discovered = self
            .fabric
            .endpoints
            .discover_endpoint(&context.fabric, initiator)
            .await?;
        merge_endpoint(&mut tx, discovered, zone);
        let discovered_zone = self
            .fabric
            .zones
            .discover_zone(&context.fabric, zone)
            .await?;
        tx.save(discovered_zone);

        let mut node: ComposedNode = tx.load(&context.node)?;
        link_asset(&mut tx, &mut node, context.kind, &context.asset)?;
        attach_related_assets(&mut tx, &mut node, target, strategy)?;

        let mut initiator_endpoint: Endpoint = tx.load(initiator)?;
        initiator_endpoint.system = Some(context.system.clone());
        tx.save(initiator_endpoint);

        node.record_connection(resolved.connection());
        let node_id = node.id.clone();
        tx.save(node.clone());

        let writes = tx.pending_writes();
        let revision = tx.commit()?;
        info!(
            "Attached {} to {} (revision {}, {} resources written)",
            context.asset, node_id, revision, writes
        );
        Ok(node)
    }
}

/// Store the remote endpoint state, keeping local-only links
fn merge_endpoint(tx: &mut Transaction, discovered: Endpoint, zone: &ResourceId) {
    let mut merged = discovered;
    if let Some(local) = tx.find::<Endpoint>(&merged.id) {
        if merged.system.is_none() {
            merged.system = local.system;
        }
        if merged.composed_node.is_none() {
            merged.composed_node = local.composed_node;
        }
    }
    merged.zone = Some(zone.clone());
    tx.save(merged);
}

/// Mark one asset as bound to the node
fn link_asset(
    tx: &mut Transaction,
    node: &mut ComposedNode,
    kind: AssetKind,
    asset: &ResourceId,
) -> Result<()> {
    let owner = Some(node.id.clone());
    match kind {
        AssetKind::Drive => {
            let mut drive: Drive = tx.load(asset)?;
            drive.allocated = true;
            drive.composed_node = owner;
            tx.save(drive);
            node.drives.insert(asset.clone());
        }
        AssetKind::Volume => {
            let mut volume: Volume = tx.load(asset)?;
            volume.allocated = true;
            volume.composed_node = owner;
            tx.save(volume);
            node.volumes.insert(asset.clone());
        }
        AssetKind::Processor => {
            let mut processor: Processor = tx.load(asset)?;
            processor.allocated = true;
            processor.composed_node = owner;
            tx.save(processor);
            node.processors.insert(asset.clone());
        }
        AssetKind::Endpoint => {
            let mut endpoint: Endpoint = tx.load(asset)?;
            endpoint.composed_node = owner;
            tx.save(endpoint);
            node.endpoints.insert(asset.clone());
        }
    }
    debug!("Linked {} {} to {}", kind, asset, node.id);
    Ok(())
}

/// Link the target endpoint, and for endpoint assets everything behind it
fn attach_related_assets(
    tx: &mut Transaction,
    node: &mut ComposedNode,
    target: &ResourceId,
    strategy: &AttachStrategy,
) -> Result<()> {
    let endpoint: Endpoint = tx.load(target)?;
    if endpoint.is_target() && !node.endpoints.contains(target) {
        link_asset(tx, node, AssetKind::Endpoint, target)?;
    }
    if !strategy.links_connected_assets {
        return Ok(());
    }

    for entity in endpoint.linked_entities() {
        let kind = match tx.resource(entity).map(|r| AssetKind::of(&r)) {
            Some(Ok(kind)) if kind != AssetKind::Endpoint => kind,
            _ => continue,
        };
        if !node.has_asset(entity) {
            link_asset(tx, node, kind, entity)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::context::{AttachOperationContext, Resolution, ResolvedId};
    use crate::attach::strategy::AttachStrategyRegistry;
    use crate::domain::{
        ConnectedEntity, EntityRole, FabricEndpointService, FabricZoneService, Protocol, Zone,
    };
    use crate::error::Error;
    use crate::fabric::InMemoryFabricManager;
    use crate::store::ResourceGraph;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    const FABRIC: &str = "/fabrics/nvme";
    const INITIATOR: &str = "/fabrics/nvme/Endpoints/i";
    const TARGET: &str = "/fabrics/nvme/Endpoints/t";
    const ZONE: &str = "/fabrics/nvme/Zones/z";

    fn endpoint(id: &str, role: EntityRole, entity: Option<&str>) -> Endpoint {
        Endpoint {
            id: id.into(),
            fabric: Some(FABRIC.into()),
            protocol: Some(Protocol::NvmeOverFabrics),
            connected_entities: vec![ConnectedEntity {
                entity_role: role,
                entity: entity.map(ResourceId::from),
            }],
            ..Default::default()
        }
    }

    /// Remote state after a successful remote phase for `asset`
    fn remote_graph(asset: &str) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.insert(endpoint(INITIATOR, EntityRole::Initiator, None));
        graph.insert(endpoint(TARGET, EntityRole::Target, Some(asset)));
        graph.insert(Zone {
            id: ZONE.into(),
            fabric: Some(FABRIC.into()),
            endpoints: vec![INITIATOR.into(), TARGET.into()],
            ..Default::default()
        });
        graph
    }

    fn local_store() -> Arc<ResourceStore> {
        let mut graph = ResourceGraph::new();
        let mut node = ComposedNode::new("/nodes/1");
        node.system = Some("/systems/1".into());
        graph.insert(node);
        graph.insert(Drive {
            id: "/remote/drives/1".into(),
            protocol: Some(Protocol::NvmeOverFabrics),
            ..Default::default()
        });
        graph.insert(Volume {
            id: "/volumes/1".into(),
            fabric: Some(FABRIC.into()),
            ..Default::default()
        });
        ResourceStore::new(graph)
    }

    fn resolved(kind: AssetKind, asset: &str, target: &str) -> ResolvedAttachment {
        ResolvedAttachment {
            context: AttachOperationContext {
                kind,
                fabric: FABRIC.into(),
                protocol: Protocol::NvmeOverFabrics,
                node: "/nodes/1".into(),
                asset: asset.into(),
                system: "/systems/1".into(),
                system_uuid: Some(Uuid::from_u128(1)),
            },
            initiator_endpoint: ResolvedId::new(INITIATOR.into(), Resolution::Created),
            target_endpoint: ResolvedId::new(target.into(), Resolution::Created),
            zone: ResolvedId::new(ZONE.into(), Resolution::Created),
        }
    }

    /// Zone service that rewrites the target endpoint in the local store
    /// while a commit is in flight
    struct RacingZones {
        inner: Arc<InMemoryFabricManager>,
        store: Arc<ResourceStore>,
        races: AtomicU32,
    }

    #[async_trait]
    impl FabricZoneService for RacingZones {
        async fn create_zone(
            &self,
            fabric: &ResourceId,
            initiator: &ResourceId,
            target: &ResourceId,
        ) -> Result<ResourceId> {
            self.inner.create_zone(fabric, initiator, target).await
        }

        async fn update_zone(&self, zone: &ResourceId, target: &ResourceId) -> Result<()> {
            self.inner.update_zone(zone, target).await
        }

        async fn zone_for_endpoint(
            &self,
            fabric: &ResourceId,
            endpoint: &ResourceId,
        ) -> Result<Option<Zone>> {
            self.inner.zone_for_endpoint(fabric, endpoint).await
        }

        async fn discover_zone(&self, fabric: &ResourceId, zone: &ResourceId) -> Result<Zone> {
            let raced = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if raced {
                let target = self.inner.discover_endpoint(fabric, &TARGET.into()).await?;
                self.store.upsert(target);
            }
            self.inner.discover_zone(fabric, zone).await
        }
    }

    fn racing_committer(races: u32) -> (LocalAttachCommitter, Arc<ResourceStore>, Arc<ComposerMetrics>) {
        let store = local_store();
        let manager = Arc::new(InMemoryFabricManager::from_graph(&remote_graph("/remote/drives/1")));
        let fabric = FabricServices {
            endpoints: manager.clone(),
            zones: Arc::new(RacingZones {
                inner: manager,
                store: store.clone(),
                races: AtomicU32::new(races),
            }),
        };
        let metrics = Arc::new(ComposerMetrics::new().unwrap());
        let committer =
            LocalAttachCommitter::new(store.clone(), fabric, 3).with_metrics(metrics.clone());
        (committer, store, metrics)
    }

    fn drive_strategy() -> &'static AttachStrategy {
        AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap()
    }

    #[tokio::test]
    async fn test_commit_links_everything() {
        let store = local_store();
        let manager = Arc::new(InMemoryFabricManager::from_graph(&remote_graph("/remote/drives/1")));
        let committer = LocalAttachCommitter::new(
            store.clone(),
            FabricServices::from_adapter(manager),
            3,
        );
        let resolved = resolved(AssetKind::Drive, "/remote/drives/1", TARGET);

        let node = committer.commit(&resolved, drive_strategy()).await.unwrap();

        assert!(node.drives.contains(&"/remote/drives/1".into()));
        assert!(node.endpoints.contains(&TARGET.into()));
        assert_eq!(node.connection_for(&"/remote/drives/1".into()), Some(&resolved.connection()));

        let drive = store.get::<Drive>(&"/remote/drives/1".into()).unwrap();
        assert!(drive.allocated);
        assert_eq!(drive.composed_node.as_ref().map(|n| n.as_str()), Some("/nodes/1"));

        let initiator = store.get::<Endpoint>(&INITIATOR.into()).unwrap();
        assert_eq!(initiator.system.as_ref().map(|s| s.as_str()), Some("/systems/1"));
        assert_eq!(initiator.zone.as_ref().map(|z| z.as_str()), Some(ZONE));
        assert!(store.get::<Zone>(&ZONE.into()).is_some());
        assert_eq!(store.get::<ComposedNode>(&"/nodes/1".into()).unwrap(), node);
    }

    #[tokio::test]
    async fn test_endpoint_asset_links_connected_volume() {
        let store = local_store();
        let manager = Arc::new(InMemoryFabricManager::from_graph(&remote_graph("/volumes/1")));
        let committer =
            LocalAttachCommitter::new(store.clone(), FabricServices::from_adapter(manager), 3);
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Endpoint).unwrap();
        let resolved = resolved(AssetKind::Endpoint, TARGET, TARGET);

        let node = committer.commit(&resolved, strategy).await.unwrap();

        assert!(node.endpoints.contains(&TARGET.into()));
        assert!(node.volumes.contains(&"/volumes/1".into()));
        assert!(store.get::<Volume>(&"/volumes/1".into()).unwrap().allocated);
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let (committer, store, metrics) = racing_committer(1);
        let resolved = resolved(AssetKind::Drive, "/remote/drives/1", TARGET);

        let node = committer.commit(&resolved, drive_strategy()).await.unwrap();

        assert!(node.drives.contains(&"/remote/drives/1".into()));
        assert_eq!(metrics.commit_retries(), 1);
        assert!(store.get::<Drive>(&"/remote/drives/1".into()).unwrap().allocated);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (committer, store, metrics) = racing_committer(10);
        let resolved = resolved(AssetKind::Drive, "/remote/drives/1", TARGET);

        assert_matches!(
            committer.commit(&resolved, drive_strategy()).await,
            Err(Error::TransientCommit { attempts: 3, .. })
        );
        assert_eq!(metrics.commit_retries(), 2);
        // Nothing from the rolled back attempts is visible
        assert!(!store.get::<Drive>(&"/remote/drives/1".into()).unwrap().allocated);
        assert!(store
            .get::<ComposedNode>(&"/nodes/1".into())
            .unwrap()
            .connections
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_node_is_not_retried() {
        let (committer, _store, metrics) = racing_committer(0);
        let mut resolved = resolved(AssetKind::Drive, "/remote/drives/1", TARGET);
        resolved.context.node = "/nodes/none".into();

        assert_matches!(
            committer.commit(&resolved, drive_strategy()).await,
            Err(Error::EntityNotFound { .. })
        );
        assert_eq!(metrics.commit_retries(), 0);
    }
}
