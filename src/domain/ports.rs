//! Domain Ports - Boundaries to external collaborators
//!
//! Entity resolution and lookup are served by the local resource graph.
//! Endpoint and zone management are served by the external fabric manager;
//! adapters in [`crate::fabric`] implement those ports.

use super::fabric::{Endpoint, Zone};
use super::resource::Entity;
use super::types::{Protocol, ResourceId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Entity Resolution Ports
// =============================================================================

/// Resolve an opaque identifier to a typed entity
pub trait EntityResolver {
    /// Fails with `Error::EntityNotFound` when absent or of another kind
    fn resolve<T: Entity>(&self, id: &ResourceId) -> Result<&T>;
}

/// Generic lookup over the resource graph
pub trait EntityStore: EntityResolver {
    fn find<T: Entity>(&self, id: &ResourceId) -> Option<&T>;

    fn find_all<T: Entity>(&self) -> Vec<&T>;
}

// =============================================================================
// Fabric Manager Ports
// =============================================================================

/// Endpoint management on the external fabric manager
#[async_trait]
pub trait FabricEndpointService: Send + Sync {
    /// Create an initiator endpoint identified by a durable name derived
    /// from `system_uuid`, bound to `connection_ports` on PCIe-class fabrics
    async fn create_initiator_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        system_uuid: Uuid,
        connection_ports: &[ResourceId],
    ) -> Result<ResourceId>;

    /// Create a target endpoint for `asset` with a fresh durable name
    async fn create_target_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        asset: &ResourceId,
    ) -> Result<ResourceId>;

    async fn initiator_endpoint_by_system_uuid(
        &self,
        fabric: &ResourceId,
        system_uuid: Uuid,
    ) -> Result<ResourceId>;

    async fn target_endpoint_by_related_asset(
        &self,
        fabric: &ResourceId,
        asset: &ResourceId,
    ) -> Result<ResourceId>;

    /// Current remote state of an endpoint
    async fn discover_endpoint(&self, fabric: &ResourceId, endpoint: &ResourceId)
        -> Result<Endpoint>;
}

/// Zone management on the external fabric manager
#[async_trait]
pub trait FabricZoneService: Send + Sync {
    async fn create_zone(
        &self,
        fabric: &ResourceId,
        initiator: &ResourceId,
        target: &ResourceId,
    ) -> Result<ResourceId>;

    /// Add `target` to an existing zone; adding a present member is a no-op
    async fn update_zone(&self, zone: &ResourceId, target: &ResourceId) -> Result<()>;

    async fn zone_for_endpoint(&self, fabric: &ResourceId, endpoint: &ResourceId)
        -> Result<Option<Zone>>;

    /// Current remote state of a zone
    async fn discover_zone(&self, fabric: &ResourceId, zone: &ResourceId) -> Result<Zone>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type FabricEndpointServiceRef = Arc<dyn FabricEndpointService>;
pub type FabricZoneServiceRef = Arc<dyn FabricZoneService>;
