//! Attacher
//!
//! Runs one attach end to end:
//!
//! ```text
//! Unvalidated -> Validated -> RemoteResolved -> LocallyCommitted -> Attached
//!   strategy.validate   coordinator.resolve   committer.commit
//! ```
//!
//! Validation and the remote phase read a snapshot of the store; only the
//! committer writes, in its own transaction.

use super::commit::LocalAttachCommitter;
use super::context::ResolvedAttachment;
use super::remote::RemoteAttachCoordinator;
use super::strategy::{AssetKind, AttachStrategyRegistry};
use crate::config::AttachConfig;
use crate::domain::{ComposedNode, Protocol, ResourceId};
use crate::error::{Error, Result, Violations};
use crate::fabric::FabricServices;
use crate::metrics::ComposerMetrics;
use crate::store::{ResourceGraph, ResourceStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// The committed node and how each fabric object was obtained
#[derive(Debug, Clone, Serialize)]
pub struct AttachOutcome {
    pub node: ComposedNode,
    pub attachment: ResolvedAttachment,
}

pub struct Attacher {
    store: Arc<ResourceStore>,
    coordinator: RemoteAttachCoordinator,
    committer: LocalAttachCommitter,
    metrics: Option<Arc<ComposerMetrics>>,
}

impl Attacher {
    pub fn new(store: Arc<ResourceStore>, fabric: FabricServices, config: &AttachConfig) -> Self {
        Self {
            coordinator: RemoteAttachCoordinator::new(fabric.clone()),
            committer: LocalAttachCommitter::new(store.clone(), fabric, config.commit_attempts),
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ComposerMetrics>) -> Self {
        self.committer = self.committer.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Attach `asset` to `node`, optionally over an explicitly requested protocol
    pub async fn attach(
        &self,
        node: &ResourceId,
        asset: &ResourceId,
        protocol: Option<Protocol>,
    ) -> Result<AttachOutcome> {
        let graph = self.store.snapshot();
        let result = self.attach_with(&graph, node, asset, protocol).await;

        if let Some(metrics) = &self.metrics {
            let kind = graph
                .resource(asset)
                .and_then(|r| AssetKind::of(r).ok())
                .map(|k| k.as_str())
                .unwrap_or("unknown");
            metrics.record_attach(kind, outcome_label(&result));
        }
        if let Err(e) = &result {
            warn!("Attach of {} to {} failed: {}", asset, node, e);
        }
        result
    }

    async fn attach_with(
        &self,
        graph: &ResourceGraph,
        node: &ResourceId,
        asset: &ResourceId,
        protocol: Option<Protocol>,
    ) -> Result<AttachOutcome> {
        let resource = graph.resource(asset).ok_or_else(|| {
            Error::Validation(Violations::from(vec![format!(
                "Specified resource ({}) does not exist.",
                asset
            )]))
        })?;
        let strategy = AttachStrategyRegistry::strategy_for_resource(resource)?;

        strategy.validate(graph, node, asset, protocol)?;
        let context = strategy.context(graph, node, asset, protocol)?;
        info!(
            "Attaching {} {} to {} over {} ({})",
            context.kind, asset, node, context.fabric, context.protocol
        );

        let attachment = self.coordinator.resolve(graph, context, strategy).await?;
        let node = self.committer.commit(&attachment, strategy).await?;
        Ok(AttachOutcome { node, attachment })
    }
}

fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "attached",
        Err(
            Error::Validation(_)
            | Error::StateMismatch { .. }
            | Error::NotSupported { .. }
            | Error::EntityNotFound { .. },
        ) => "rejected",
        Err(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::context::Resolution;
    use crate::domain::{Drive, Endpoint, Processor};
    use crate::fabric::{FabricOperation, InMemoryFabricManager};
    use crate::store::topology::fixtures::pcie_pod;
    use assert_matches::assert_matches;

    struct Harness {
        store: Arc<ResourceStore>,
        manager: Arc<InMemoryFabricManager>,
        metrics: Arc<ComposerMetrics>,
        attacher: Attacher,
    }

    fn harness() -> Harness {
        let mut graph = pcie_pod();
        let mut node = ComposedNode::new("/nodes/1");
        node.system = Some("/systems/1".into());
        graph.insert(node);

        let store = ResourceStore::new(graph.clone());
        let manager = Arc::new(InMemoryFabricManager::from_graph(&graph));
        let metrics = Arc::new(ComposerMetrics::new().unwrap());
        let attacher = Attacher::new(
            store.clone(),
            FabricServices::from_adapter(manager.clone()),
            &AttachConfig::default(),
        )
        .with_metrics(metrics.clone());
        Harness {
            store,
            manager,
            metrics,
            attacher,
        }
    }

    #[tokio::test]
    async fn test_attach_two_drives_shares_initiator_and_zone() {
        let h = harness();
        let node: ResourceId = "/nodes/1".into();

        let first = h
            .attacher
            .attach(&node, &"/chassis/drawer/drives/1".into(), None)
            .await
            .unwrap();
        assert_eq!(first.attachment.initiator_endpoint.resolution, Resolution::Created);
        assert_eq!(first.attachment.zone.resolution, Resolution::Created);

        let second = h
            .attacher
            .attach(&node, &"/chassis/drawer/drives/2".into(), None)
            .await
            .unwrap();
        assert_eq!(second.attachment.initiator_endpoint.resolution, Resolution::Reused);
        assert_eq!(second.attachment.zone.resolution, Resolution::Reused);
        assert_eq!(second.attachment.zone.id, first.attachment.zone.id);

        assert_eq!(h.manager.zones_created().await, 1);
        assert_eq!(h.manager.endpoints_created().await, 3);
        assert_eq!(second.node.drives.len(), 2);
        assert_eq!(second.node.connections.len(), 2);

        let initiator = h
            .store
            .get::<Endpoint>(&first.attachment.initiator_endpoint.id)
            .unwrap();
        assert_eq!(initiator.system.as_ref().map(|s| s.as_str()), Some("/systems/1"));
        assert_eq!(h.metrics.attach_operations("drive", "attached"), 2);
    }

    #[tokio::test]
    async fn test_attached_drive_cannot_be_attached_again() {
        let h = harness();
        let node: ResourceId = "/nodes/1".into();
        let drive: ResourceId = "/chassis/drawer/drives/1".into();

        h.attacher.attach(&node, &drive, None).await.unwrap();
        assert!(h.store.get::<Drive>(&drive).unwrap().allocated);

        let err = h.attacher.attach(&node, &drive, None).await.unwrap_err();
        let violations = err.violations().unwrap();
        assert!(violations.iter().any(|v| v.contains("already allocated")));
        assert_eq!(h.metrics.attach_operations("drive", "rejected"), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_touches_nothing() {
        let h = harness();
        let revision = h.store.revision();

        assert_matches!(
            h.attacher
                .attach(
                    &"/nodes/1".into(),
                    &"/chassis/drawer/drives/1".into(),
                    Some(Protocol::Iscsi)
                )
                .await,
            Err(Error::Validation(_))
        );
        assert_eq!(h.manager.endpoints_created().await, 0);
        assert_eq!(h.store.revision(), revision);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_no_local_state() {
        let h = harness();
        h.manager
            .fail_next(FabricOperation::CreateTargetEndpoint, 1)
            .await;
        let fpga: ResourceId = "/chassis/drawer/processors/fpga1".into();

        assert_matches!(
            h.attacher.attach(&"/nodes/1".into(), &fpga, None).await,
            Err(Error::RemoteOperation { .. })
        );
        assert!(!h.store.get::<Processor>(&fpga).unwrap().allocated);
        assert_eq!(h.store.revision(), 0);
        assert_eq!(h.metrics.attach_operations("processor", "failed"), 1);

        let outcome = h.attacher.attach(&"/nodes/1".into(), &fpga, None).await.unwrap();
        assert!(outcome.node.processors.contains(&fpga));
    }

    #[tokio::test]
    async fn test_unknown_and_unsupported_assets() {
        let h = harness();
        let node: ResourceId = "/nodes/1".into();

        assert_matches!(
            h.attacher.attach(&node, &"/nowhere".into(), None).await,
            Err(Error::Validation(_))
        );
        assert_matches!(
            h.attacher.attach(&node, &"/systems/2".into(), None).await,
            Err(Error::NotSupported { .. })
        );
        assert_eq!(h.metrics.attach_operations("unknown", "rejected"), 2);
    }
}
