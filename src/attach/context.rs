//! Values threaded between the remote and local attach phases

use super::strategy::AssetKind;
use crate::domain::{FabricConnection, Protocol, ResourceId};
use serde::Serialize;
use uuid::Uuid;

/// Everything one attach attempt needs to know before touching the fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachOperationContext {
    pub kind: AssetKind,
    pub fabric: ResourceId,
    pub protocol: Protocol,
    pub node: ResourceId,
    pub asset: ResourceId,
    /// System the node is bound to
    pub system: ResourceId,
    pub system_uuid: Option<Uuid>,
}

/// How a fabric object was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Already known locally or already zoned
    Reused,
    Created,
    /// Creation was rejected as a duplicate and the existing object was queried
    Recovered,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Reused => write!(f, "reused"),
            Resolution::Created => write!(f, "created"),
            Resolution::Recovered => write!(f, "recovered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedId {
    pub id: ResourceId,
    pub resolution: Resolution,
}

impl ResolvedId {
    pub fn new(id: ResourceId, resolution: Resolution) -> Self {
        Self { id, resolution }
    }
}

/// Outcome of the remote phase, consumed read-only by the local commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAttachment {
    pub context: AttachOperationContext,
    pub initiator_endpoint: ResolvedId,
    pub target_endpoint: ResolvedId,
    pub zone: ResolvedId,
}

impl ResolvedAttachment {
    pub fn connection(&self) -> FabricConnection {
        FabricConnection {
            fabric: self.context.fabric.clone(),
            asset: self.context.asset.clone(),
            initiator_endpoint: self.initiator_endpoint.id.clone(),
            target_endpoint: self.target_endpoint.id.clone(),
            zone: self.zone.id.clone(),
        }
    }
}
