//! Endpoint lookups shared by the attach flow and the fabric adapters

use crate::domain::{ComputerSystem, Endpoint, ResourceId};
use crate::error::{Error, Result};
use crate::store::ResourceGraph;
use uuid::Uuid;

pub struct EndpointLookup;

impl EndpointLookup {
    /// Initiator endpoint acting for `system` on `fabric`
    pub fn initiator_for_system<'a>(
        graph: &'a ResourceGraph,
        system: &ComputerSystem,
        fabric: &ResourceId,
    ) -> Result<&'a Endpoint> {
        graph
            .endpoints_of_system(&system.id)
            .find(|e| e.is_initiator() && e.is_on_fabric(fabric))
            .ok_or_else(|| {
                Error::not_found(
                    "Endpoint",
                    format!(
                        "Cannot find initiator endpoint for system {} on fabric {}",
                        system.id, fabric
                    ),
                )
            })
    }

    /// Initiator endpoint whose durable name embeds `system_uuid`
    pub fn initiator_with_uuid<'a>(
        endpoints: impl IntoIterator<Item = &'a Endpoint>,
        system_uuid: Uuid,
    ) -> Result<&'a Endpoint> {
        let fragment = system_uuid.to_string();
        endpoints
            .into_iter()
            .find(|e| e.is_initiator() && e.has_durable_name_containing(&fragment))
            .ok_or_else(|| {
                Error::not_found(
                    "Endpoint",
                    format!("Cannot find initiator endpoint for system uuid {}", system_uuid),
                )
            })
    }

    /// Target endpoint whose connected entity is `asset`
    pub fn target_for_asset<'a>(
        endpoints: impl IntoIterator<Item = &'a Endpoint>,
        asset: &ResourceId,
    ) -> Result<&'a Endpoint> {
        endpoints
            .into_iter()
            .find(|e| {
                e.connected_entities
                    .iter()
                    .any(|c| c.entity_role.acts_as_target() && c.entity.as_ref() == Some(asset))
            })
            .ok_or_else(|| {
                Error::not_found(
                    "Endpoint",
                    format!("Cannot find target endpoint for asset {}", asset),
                )
            })
    }
}
