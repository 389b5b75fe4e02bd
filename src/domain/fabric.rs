//! Fabric topology entities: fabrics, PCIe switches and ports, endpoints
//! and zones.

use super::types::{DurableNameFormat, EntityRole, PortType, Protocol, ResourceId, Status};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const IQN_PREFIX: &str = "iqn.1986-03.com.intel:";
const NQN_PREFIX: &str = "nqn.2014-08.org.nvmexpress:uuid:";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fabric {
    pub id: ResourceId,
    pub name: Option<String>,
    pub protocol: Option<Protocol>,
    pub status: Status,
}

impl Fabric {
    pub fn endpoints_collection(&self) -> ResourceId {
        self.id.child("Endpoints")
    }

    pub fn zones_collection(&self) -> ResourceId {
        self.id.child("Zones")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Switch {
    pub id: ResourceId,
    pub chassis: Option<ResourceId>,
    pub fabric: Option<ResourceId>,
    pub protocol: Option<Protocol>,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub id: ResourceId,
    pub switch: Option<ResourceId>,
    pub port_type: Option<PortType>,
    pub pcie_connection_ids: Vec<String>,
    pub status: Status,
}

impl Port {
    pub fn is_upstream(&self) -> bool {
        self.port_type == Some(PortType::UpstreamPort)
    }
}

// =============================================================================
// Endpoint
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub durable_name: String,
    pub durable_name_format: DurableNameFormat,
}

impl Identifier {
    /// Durable name for `uuid` in the format the fabric protocol expects
    pub fn for_uuid(protocol: Protocol, uuid: Uuid) -> Self {
        let format = protocol.durable_name_format();
        let durable_name = match format {
            DurableNameFormat::Iqn => format!("{}{}", IQN_PREFIX, uuid),
            DurableNameFormat::Nqn => format!("{}{}", NQN_PREFIX, uuid),
            DurableNameFormat::Uuid => uuid.to_string(),
        };
        Self {
            durable_name,
            durable_name_format: format,
        }
    }

    /// Fresh durable name for a newly exposed target
    pub fn random(protocol: Protocol) -> Self {
        Self::for_uuid(protocol, Uuid::new_v4())
    }
}

/// Link from an endpoint to the entity it represents on the fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedEntity {
    pub entity_role: EntityRole,
    pub entity: Option<ResourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub id: ResourceId,
    pub fabric: Option<ResourceId>,
    pub protocol: Option<Protocol>,
    pub identifiers: Vec<Identifier>,
    pub connected_entities: Vec<ConnectedEntity>,
    pub ports: Vec<ResourceId>,
    pub zone: Option<ResourceId>,
    /// System on whose behalf an initiator endpoint acts
    pub system: Option<ResourceId>,
    pub composed_node: Option<ResourceId>,
    pub status: Status,
}

impl Endpoint {
    pub fn is_initiator(&self) -> bool {
        self.connected_entities
            .iter()
            .any(|e| e.entity_role.acts_as_initiator())
    }

    pub fn is_target(&self) -> bool {
        self.connected_entities
            .iter()
            .any(|e| e.entity_role.acts_as_target())
    }

    /// Whether any connected entity references `asset`
    pub fn links(&self, asset: &ResourceId) -> bool {
        self.connected_entities
            .iter()
            .any(|e| e.entity.as_ref() == Some(asset))
    }

    pub fn linked_entities(&self) -> impl Iterator<Item = &ResourceId> {
        self.connected_entities.iter().filter_map(|e| e.entity.as_ref())
    }

    pub fn has_durable_name_containing(&self, fragment: &str) -> bool {
        self.identifiers
            .iter()
            .any(|i| i.durable_name.contains(fragment))
    }

    /// Zoned or already bound to a node
    pub fn is_in_use(&self) -> bool {
        self.zone.is_some() || self.composed_node.is_some()
    }

    pub fn is_on_fabric(&self, fabric: &ResourceId) -> bool {
        self.fabric.as_ref() == Some(fabric)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Zone {
    pub id: ResourceId,
    pub fabric: Option<ResourceId>,
    pub endpoints: Vec<ResourceId>,
    pub status: Status,
}

impl Zone {
    pub fn contains(&self, endpoint: &ResourceId) -> bool {
        self.endpoints.contains(endpoint)
    }
}
