//! In-Memory Fabric Manager
//!
//! Simulates the remote fabric manager for `--simulate` runs and tests.
//! Mirrors the manager's conflict behavior: creating a second initiator
//! with the same durable name, a second target for the same asset, or a
//! second zone around a zoned initiator is rejected as a bad request.

use crate::attach::EndpointLookup;
use crate::domain::{
    ConnectedEntity, Endpoint, EntityRole, FabricEndpointService, FabricZoneService, Identifier,
    Protocol, ResourceId, Zone,
};
use crate::error::{Error, Result};
use crate::store::ResourceGraph;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Remote operations that accept injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FabricOperation {
    CreateInitiatorEndpoint,
    CreateTargetEndpoint,
    CreateZone,
    UpdateZone,
    Discover,
}

impl std::fmt::Display for FabricOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FabricOperation::CreateInitiatorEndpoint => write!(f, "create initiator endpoint"),
            FabricOperation::CreateTargetEndpoint => write!(f, "create target endpoint"),
            FabricOperation::CreateZone => write!(f, "create zone"),
            FabricOperation::UpdateZone => write!(f, "update zone"),
            FabricOperation::Discover => write!(f, "discover"),
        }
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    endpoints: BTreeMap<ResourceId, Endpoint>,
    zones: BTreeMap<ResourceId, Zone>,
    next_id: u64,
    endpoints_created: u64,
    zones_created: u64,
    /// Remaining injected failures per operation
    failures: HashMap<FabricOperation, u32>,
}

impl ManagerState {
    fn take_failure(&mut self, operation: FabricOperation) -> Result<()> {
        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::remote(operation.to_string(), "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn allocate_id(&mut self, collection: ResourceId) -> ResourceId {
        loop {
            self.next_id += 1;
            let id = collection.child(&self.next_id.to_string());
            if !self.endpoints.contains_key(&id) && !self.zones.contains_key(&id) {
                return id;
            }
        }
    }

    fn endpoints_on<'a>(&'a self, fabric: &'a ResourceId) -> impl Iterator<Item = &'a Endpoint> {
        self.endpoints.values().filter(move |e| e.is_on_fabric(fabric))
    }
}

pub struct InMemoryFabricManager {
    state: RwLock<ManagerState>,
}

impl Default for InMemoryFabricManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFabricManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Seed remote state with the endpoints and zones already in `graph`
    pub fn from_graph(graph: &ResourceGraph) -> Self {
        let state = ManagerState {
            endpoints: graph
                .all::<Endpoint>()
                .map(|e| (e.id.clone(), e.clone()))
                .collect(),
            zones: graph
                .all::<Zone>()
                .map(|z| (z.id.clone(), z.clone()))
                .collect(),
            ..Default::default()
        };
        debug!(
            "Seeded fabric manager with {} endpoints and {} zones",
            state.endpoints.len(),
            state.zones.len()
        );
        Self {
            state: RwLock::new(state),
        }
    }

    /// Fail the next `times` calls of `operation` with `RemoteOperation`
    pub async fn fail_next(&self, operation: FabricOperation, times: u32) {
        self.state.write().await.failures.insert(operation, times);
    }

    pub async fn endpoints_created(&self) -> u64 {
        self.state.read().await.endpoints_created
    }

    pub async fn zones_created(&self) -> u64 {
        self.state.read().await.zones_created
    }

    pub async fn zone_count(&self) -> usize {
        self.state.read().await.zones.len()
    }

    pub async fn endpoint(&self, id: &ResourceId) -> Option<Endpoint> {
        self.state.read().await.endpoints.get(id).cloned()
    }

    pub async fn zone(&self, id: &ResourceId) -> Option<Zone> {
        self.state.read().await.zones.get(id).cloned()
    }
}

fn conflict(operation: FabricOperation, reason: String) -> Error {
    Error::RemoteConflict {
        operation: operation.to_string(),
        reason,
    }
}

#[async_trait]
impl FabricEndpointService for InMemoryFabricManager {
    async fn create_initiator_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        system_uuid: Uuid,
        connection_ports: &[ResourceId],
    ) -> Result<ResourceId> {
        let operation = FabricOperation::CreateInitiatorEndpoint;
        let mut state = self.state.write().await;
        state.take_failure(operation)?;

        let identifier = Identifier::for_uuid(protocol, system_uuid);
        if state
            .endpoints_on(fabric)
            .any(|e| e.identifiers.contains(&identifier))
        {
            return Err(conflict(
                operation,
                format!("durable name {} already exists", identifier.durable_name),
            ));
        }

        let id = state.allocate_id(fabric.child("Endpoints"));
        state.endpoints.insert(
            id.clone(),
            Endpoint {
                id: id.clone(),
                fabric: Some(fabric.clone()),
                protocol: Some(protocol),
                identifiers: vec![identifier],
                connected_entities: vec![ConnectedEntity {
                    entity_role: EntityRole::Initiator,
                    entity: None,
                }],
                ports: connection_ports.to_vec(),
                ..Default::default()
            },
        );
        state.endpoints_created += 1;
        info!("Created initiator endpoint {} on {}", id, fabric);
        Ok(id)
    }

    async fn create_target_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        asset: &ResourceId,
    ) -> Result<ResourceId> {
        let operation = FabricOperation::CreateTargetEndpoint;
        let mut state = self.state.write().await;
        state.take_failure(operation)?;

        if EndpointLookup::target_for_asset(state.endpoints_on(fabric), asset).is_ok() {
            return Err(conflict(
                operation,
                format!("target endpoint for {} already exists", asset),
            ));
        }

        let id = state.allocate_id(fabric.child("Endpoints"));
        state.endpoints.insert(
            id.clone(),
            Endpoint {
                id: id.clone(),
                fabric: Some(fabric.clone()),
                protocol: Some(protocol),
                identifiers: vec![Identifier::random(protocol)],
                connected_entities: vec![ConnectedEntity {
                    entity_role: EntityRole::Target,
                    entity: Some(asset.clone()),
                }],
                ..Default::default()
            },
        );
        state.endpoints_created += 1;
        info!("Created target endpoint {} for {}", id, asset);
        Ok(id)
    }

    async fn initiator_endpoint_by_system_uuid(
        &self,
        fabric: &ResourceId,
        system_uuid: Uuid,
    ) -> Result<ResourceId> {
        let state = self.state.read().await;
        EndpointLookup::initiator_with_uuid(state.endpoints_on(fabric), system_uuid)
            .map(|e| e.id.clone())
    }

    async fn target_endpoint_by_related_asset(
        &self,
        fabric: &ResourceId,
        asset: &ResourceId,
    ) -> Result<ResourceId> {
        let state = self.state.read().await;
        EndpointLookup::target_for_asset(state.endpoints_on(fabric), asset).map(|e| e.id.clone())
    }

    async fn discover_endpoint(&self, _fabric: &ResourceId, endpoint: &ResourceId) -> Result<Endpoint> {
        let mut state = self.state.write().await;
        state.take_failure(FabricOperation::Discover)?;
        state
            .endpoints
            .get(endpoint)
            .cloned()
            .ok_or_else(|| Error::not_found("Endpoint", endpoint))
    }
}

#[async_trait]
impl FabricZoneService for InMemoryFabricManager {
    async fn create_zone(
        &self,
        fabric: &ResourceId,
        initiator: &ResourceId,
        target: &ResourceId,
    ) -> Result<ResourceId> {
        let operation = FabricOperation::CreateZone;
        let mut state = self.state.write().await;
        state.take_failure(operation)?;

        for member in [initiator, target] {
            if !state.endpoints.contains_key(member) {
                return Err(Error::not_found("Endpoint", member));
            }
        }
        if let Some(zone) = state.zones.values().find(|z| z.contains(initiator)) {
            return Err(conflict(
                operation,
                format!("{} is already zoned in {}", initiator, zone.id),
            ));
        }

        let id = state.allocate_id(fabric.child("Zones"));
        state.zones.insert(
            id.clone(),
            Zone {
                id: id.clone(),
                fabric: Some(fabric.clone()),
                endpoints: vec![initiator.clone(), target.clone()],
                ..Default::default()
            },
        );
        for member in [initiator, target] {
            if let Some(endpoint) = state.endpoints.get_mut(member) {
                endpoint.zone = Some(id.clone());
            }
        }
        state.zones_created += 1;
        info!("Created zone {} with {} and {}", id, initiator, target);
        Ok(id)
    }

    async fn update_zone(&self, zone: &ResourceId, target: &ResourceId) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_failure(FabricOperation::UpdateZone)?;

        if !state.endpoints.contains_key(target) {
            return Err(Error::not_found("Endpoint", target));
        }
        let members = state
            .zones
            .get_mut(zone)
            .ok_or_else(|| Error::not_found("Zone", zone))?;
        if !members.contains(target) {
            members.endpoints.push(target.clone());
            debug!("Added {} to zone {}", target, zone);
        }
        if let Some(endpoint) = state.endpoints.get_mut(target) {
            endpoint.zone = Some(zone.clone());
        }
        Ok(())
    }

    async fn zone_for_endpoint(
        &self,
        fabric: &ResourceId,
        endpoint: &ResourceId,
    ) -> Result<Option<Zone>> {
        let state = self.state.read().await;
        Ok(state
            .zones
            .values()
            .find(|z| z.fabric.as_ref() == Some(fabric) && z.contains(endpoint))
            .cloned())
    }

    async fn discover_zone(&self, _fabric: &ResourceId, zone: &ResourceId) -> Result<Zone> {
        let mut state = self.state.write().await;
        state.take_failure(FabricOperation::Discover)?;
        state
            .zones
            .get(zone)
            .cloned()
            .ok_or_else(|| Error::not_found("Zone", zone))
    }
}
