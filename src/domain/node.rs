//! Composed node aggregate

use super::types::{ResourceId, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Allocating,
    Allocated,
    Assembling,
    Assembled,
    Failed,
}

/// Initiator, target and zone that wire one asset to the node's system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConnection {
    pub fabric: ResourceId,
    pub asset: ResourceId,
    pub initiator_endpoint: ResourceId,
    pub target_endpoint: ResourceId,
    pub zone: ResourceId,
}

/// A logical node composed from pod resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposedNode {
    pub id: ResourceId,
    pub name: Option<String>,
    pub system: Option<ResourceId>,
    pub state: NodeState,
    pub status: Status,
    pub drives: BTreeSet<ResourceId>,
    pub volumes: BTreeSet<ResourceId>,
    pub processors: BTreeSet<ResourceId>,
    pub endpoints: BTreeSet<ResourceId>,
    pub connections: Vec<FabricConnection>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ComposedNode {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Record a connection, replacing any earlier one for the same asset
    pub fn record_connection(&mut self, connection: FabricConnection) {
        self.connections.retain(|c| c.asset != connection.asset);
        self.connections.push(connection);
        self.updated_at = Some(Utc::now());
    }

    pub fn connection_for(&self, asset: &ResourceId) -> Option<&FabricConnection> {
        self.connections.iter().find(|c| &c.asset == asset)
    }

    pub fn has_asset(&self, asset: &ResourceId) -> bool {
        self.drives.contains(asset)
            || self.volumes.contains(asset)
            || self.processors.contains(asset)
            || self.endpoints.contains(asset)
    }
}
