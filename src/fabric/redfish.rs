//! Redfish Fabric Client
//!
//! Talks to a Redfish-style fabric manager over HTTP(S):
//!
//! ```text
//! create endpoint   POST  {fabric}/Endpoints
//! create zone       POST  {fabric}/Zones
//! update zone       PATCH {zone}          (full endpoint link list)
//! discovery         GET   collections and members
//! ```
//!
//! A 400 or 409 answer means the object already exists and is reported as
//! `Error::RemoteConflict`; any other failure status is
//! `Error::RemoteOperation`.

use crate::attach::EndpointLookup;
use crate::config::FabricConfig;
use crate::domain::{
    ConnectedEntity, DurableNameFormat, Endpoint, EntityRole, FabricEndpointService,
    FabricZoneService, Identifier, Protocol, ResourceId, Zone,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ODataLink {
    #[serde(rename = "@odata.id")]
    odata_id: String,
}

impl From<&ResourceId> for ODataLink {
    fn from(id: &ResourceId) -> Self {
        Self {
            odata_id: id.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Collection {
    #[serde(default)]
    members: Vec<ODataLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireIdentifier {
    durable_name: String,
    durable_name_format: DurableNameFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireConnectedEntity {
    entity_role: EntityRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_link: Option<ODataLink>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EndpointLinks {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<ODataLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    zones: Vec<ODataLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEndpoint {
    #[serde(rename = "@odata.id", default, skip_serializing_if = "Option::is_none")]
    odata_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint_protocol: Option<Protocol>,
    #[serde(default)]
    identifiers: Vec<WireIdentifier>,
    #[serde(default)]
    connected_entities: Vec<WireConnectedEntity>,
    #[serde(default)]
    links: EndpointLinks,
}

impl WireEndpoint {
    fn into_endpoint(self, fabric: &ResourceId) -> Endpoint {
        Endpoint {
            id: self.odata_id.map(ResourceId::from).unwrap_or_default(),
            fabric: Some(fabric.clone()),
            protocol: self.endpoint_protocol,
            identifiers: self
                .identifiers
                .into_iter()
                .map(|i| Identifier {
                    durable_name: i.durable_name,
                    durable_name_format: i.durable_name_format,
                })
                .collect(),
            connected_entities: self
                .connected_entities
                .into_iter()
                .map(|c| ConnectedEntity {
                    entity_role: c.entity_role,
                    entity: c.entity_link.map(|l| l.odata_id.into()),
                })
                .collect(),
            ports: self
                .links
                .ports
                .into_iter()
                .map(|l| l.odata_id.into())
                .collect(),
            zone: self.links.zones.into_iter().next().map(|l| l.odata_id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ZoneLinks {
    endpoints: Vec<ODataLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireZone {
    #[serde(rename = "@odata.id", default, skip_serializing_if = "Option::is_none")]
    odata_id: Option<String>,
    #[serde(default)]
    links: ZoneLinks,
}

impl WireZone {
    fn with_members(members: &[&ResourceId]) -> Self {
        Self {
            odata_id: None,
            links: ZoneLinks {
                endpoints: members.iter().map(|m| ODataLink::from(*m)).collect(),
            },
        }
    }

    fn into_zone(self, fabric: &ResourceId) -> Zone {
        Zone {
            id: self.odata_id.map(ResourceId::from).unwrap_or_default(),
            fabric: Some(fabric.clone()),
            endpoints: self
                .links
                .endpoints
                .into_iter()
                .map(|l| l.odata_id.into())
                .collect(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Client
// =============================================================================

pub struct RedfishFabricClient {
    config: FabricConfig,
    client: Client,
}

impl RedfishFabricClient {
    pub fn new(config: FabricConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        info!("Using Redfish fabric manager at {}", config.base_url);
        Ok(Self { config, client })
    }

    fn url(&self, path: &ResourceId) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, operation: &str, path: &ResourceId) -> Result<T> {
        debug!("GET {}", path);
        let response = self
            .authorize(self.client.get(self.url(path)))
            .send()
            .await?;
        Ok(check(operation, response).await?.json::<T>().await?)
    }

    /// POST `body` and return the identifier of the created member
    async fn post<B: Serialize>(&self, operation: &str, path: &ResourceId, body: &B) -> Result<ResourceId> {
        debug!("POST {}", path);
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        let response = check(operation, response).await?;

        if let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|l| l.to_str().ok())
        {
            return Ok(location_path(location).into());
        }
        let created: ODataLink = response.json().await?;
        Ok(created.odata_id.into())
    }

    async fn members(&self, operation: &str, collection: &ResourceId) -> Result<Vec<ResourceId>> {
        let collection: Collection = self.get(operation, collection).await?;
        Ok(collection
            .members
            .into_iter()
            .map(|m| m.odata_id.into())
            .collect())
    }

    async fn endpoints(&self, operation: &str, fabric: &ResourceId) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::new();
        for member in self.members(operation, &fabric.child("Endpoints")).await? {
            let wire: WireEndpoint = self.get(operation, &member).await?;
            let mut endpoint = wire.into_endpoint(fabric);
            endpoint.id = member;
            endpoints.push(endpoint);
        }
        Ok(endpoints)
    }

    async fn zones(&self, operation: &str, fabric: &ResourceId) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        for member in self.members(operation, &fabric.child("Zones")).await? {
            let wire: WireZone = self.get(operation, &member).await?;
            let mut zone = wire.into_zone(fabric);
            zone.id = member;
            zones.push(zone);
        }
        Ok(zones)
    }
}

/// Map a failure status onto the error taxonomy
async fn check(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = format!("{}: {}", status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(Error::RemoteConflict {
            operation: operation.to_string(),
            reason,
        }),
        _ => Err(Error::remote(operation, reason)),
    }
}

/// Strip scheme and authority from an absolute `Location`
fn location_path(location: &str) -> &str {
    match location.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => location,
    }
}

#[async_trait]
impl FabricEndpointService for RedfishFabricClient {
    async fn create_initiator_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        system_uuid: Uuid,
        connection_ports: &[ResourceId],
    ) -> Result<ResourceId> {
        let identifier = Identifier::for_uuid(protocol, system_uuid);
        let body = WireEndpoint {
            odata_id: None,
            endpoint_protocol: Some(protocol),
            identifiers: vec![WireIdentifier {
                durable_name: identifier.durable_name,
                durable_name_format: identifier.durable_name_format,
            }],
            connected_entities: vec![WireConnectedEntity {
                entity_role: EntityRole::Initiator,
                entity_link: None,
            }],
            links: EndpointLinks {
                ports: connection_ports.iter().map(ODataLink::from).collect(),
                zones: Vec::new(),
            },
        };
        self.post("create initiator endpoint", &fabric.child("Endpoints"), &body)
            .await
    }

    async fn create_target_endpoint(
        &self,
        fabric: &ResourceId,
        protocol: Protocol,
        asset: &ResourceId,
    ) -> Result<ResourceId> {
        let identifier = Identifier::random(protocol);
        let body = WireEndpoint {
            odata_id: None,
            endpoint_protocol: Some(protocol),
            identifiers: vec![WireIdentifier {
                durable_name: identifier.durable_name,
                durable_name_format: identifier.durable_name_format,
            }],
            connected_entities: vec![WireConnectedEntity {
                entity_role: EntityRole::Target,
                entity_link: Some(asset.into()),
            }],
            links: EndpointLinks::default(),
        };
        self.post("create target endpoint", &fabric.child("Endpoints"), &body)
            .await
    }

    async fn initiator_endpoint_by_system_uuid(
        &self,
        fabric: &ResourceId,
        system_uuid: Uuid,
    ) -> Result<ResourceId> {
        let endpoints = self.endpoints("list endpoints", fabric).await?;
        EndpointLookup::initiator_with_uuid(&endpoints, system_uuid).map(|e| e.id.clone())
    }

    async fn target_endpoint_by_related_asset(
        &self,
        fabric: &ResourceId,
        asset: &ResourceId,
    ) -> Result<ResourceId> {
        let endpoints = self.endpoints("list endpoints", fabric).await?;
        EndpointLookup::target_for_asset(&endpoints, asset).map(|e| e.id.clone())
    }

    async fn discover_endpoint(&self, fabric: &ResourceId, endpoint: &ResourceId) -> Result<Endpoint> {
        let wire: WireEndpoint = self.get("discover endpoint", endpoint).await?;
        let mut discovered = wire.into_endpoint(fabric);
        discovered.id = endpoint.clone();
        Ok(discovered)
    }
}

#[async_trait]
impl FabricZoneService for RedfishFabricClient {
    async fn create_zone(
        &self,
        fabric: &ResourceId,
        initiator: &ResourceId,
        target: &ResourceId,
    ) -> Result<ResourceId> {
        let body = WireZone::with_members(&[initiator, target]);
        self.post("create zone", &fabric.child("Zones"), &body).await
    }

    async fn update_zone(&self, zone: &ResourceId, target: &ResourceId) -> Result<()> {
        let current: WireZone = self.get("update zone", zone).await?;
        let mut members: Vec<ResourceId> = current
            .links
            .endpoints
            .into_iter()
            .map(|l| l.odata_id.into())
            .collect();
        if members.contains(target) {
            return Ok(());
        }
        members.push(target.clone());

        let body = WireZone::with_members(&members.iter().collect::<Vec<_>>());
        debug!("PATCH {}", zone);
        let response = self
            .authorize(self.client.patch(self.url(zone)))
            .json(&body)
            .send()
            .await?;
        check("update zone", response).await?;
        Ok(())
    }

    async fn zone_for_endpoint(
        &self,
        fabric: &ResourceId,
        endpoint: &ResourceId,
    ) -> Result<Option<Zone>> {
        Ok(self
            .zones("list zones", fabric)
            .await?
            .into_iter()
            .find(|z| z.contains(endpoint)))
    }

    async fn discover_zone(&self, fabric: &ResourceId, zone: &ResourceId) -> Result<Zone> {
        let wire: WireZone = self.get("discover zone", zone).await?;
        let mut discovered = wire.into_zone(fabric);
        discovered.id = zone.clone();
        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_wire_format() {
        let json = r#"{
            "@odata.id": "/redfish/v1/Fabrics/1/Endpoints/7",
            "EndpointProtocol": "NVMeOverFabrics",
            "Identifiers": [{"DurableName": "nqn.2014-08.org.nvmexpress:uuid:abc", "DurableNameFormat": "NQN"}],
            "ConnectedEntities": [{"EntityRole": "Target", "EntityLink": {"@odata.id": "/redfish/v1/Volumes/3"}}],
            "Links": {"Zones": [{"@odata.id": "/redfish/v1/Fabrics/1/Zones/2"}]}
        }"#;
        let wire: WireEndpoint = serde_json::from_str(json).unwrap();
        let endpoint = wire.into_endpoint(&"/redfish/v1/Fabrics/1".into());

        assert_eq!(endpoint.id.as_str(), "/redfish/v1/Fabrics/1/Endpoints/7");
        assert_eq!(endpoint.protocol, Some(Protocol::NvmeOverFabrics));
        assert!(endpoint.is_target());
        assert!(endpoint.links(&"/redfish/v1/Volumes/3".into()));
        assert_eq!(
            endpoint.zone,
            Some(ResourceId::from("/redfish/v1/Fabrics/1/Zones/2"))
        );
    }

    #[test]
    fn test_zone_body() {
        let a: ResourceId = "/e/1".into();
        let b: ResourceId = "/e/2".into();
        let body = serde_json::to_value(WireZone::with_members(&[&a, &b])).unwrap();

        assert_eq!(
            body,
            serde_json::json!({"Links": {"Endpoints": [{"@odata.id": "/e/1"}, {"@odata.id": "/e/2"}]}})
        );
    }

    #[test]
    fn test_location_path() {
        assert_eq!(
            location_path("https://podm:8443/redfish/v1/Fabrics/1/Zones/4"),
            "/redfish/v1/Fabrics/1/Zones/4"
        );
        assert_eq!(location_path("/redfish/v1/Fabrics/1"), "/redfish/v1/Fabrics/1");
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = RedfishFabricClient::new(FabricConfig::default()).unwrap();
        assert_eq!(
            client.url(&"/redfish/v1/Fabrics/1".into()),
            "http://localhost:8443/redfish/v1/Fabrics/1"
        );
    }
}
