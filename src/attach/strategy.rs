//! Attach Strategies
//!
//! One strategy per attachable asset kind. A strategy is plain data: how
//! the asset's fabric and protocol are found, which kind-specific rules
//! apply, how its target endpoint is obtained and whether assets connected
//! to that endpoint are linked along with it. Strategies live in a static
//! table keyed by [`AssetKind`].

use super::context::AttachOperationContext;
use crate::domain::{
    ComposedNode, ComputerSystem, EntityResolver, Fabric, Protocol, Resource, ResourceId, Status,
};
use crate::error::{Error, Result, Violations};
use crate::store::ResourceGraph;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

// =============================================================================
// Asset Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Drive,
    Volume,
    Processor,
    Endpoint,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Drive,
        AssetKind::Volume,
        AssetKind::Processor,
        AssetKind::Endpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Drive => "drive",
            AssetKind::Volume => "volume",
            AssetKind::Processor => "processor",
            AssetKind::Endpoint => "endpoint",
        }
    }

    /// Kind of an existing resource; anything else cannot be attached
    pub fn of(resource: &Resource) -> Result<Self> {
        match resource {
            Resource::Drive(_) => Ok(AssetKind::Drive),
            Resource::Volume(_) => Ok(AssetKind::Volume),
            Resource::Processor(_) => Ok(AssetKind::Processor),
            Resource::Endpoint(_) => Ok(AssetKind::Endpoint),
            other => Err(Error::NotSupported {
                what: format!("attaching a {} ({})", other.kind(), other.id()),
            }),
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "drive" => Ok(AssetKind::Drive),
            "volume" => Ok(AssetKind::Volume),
            "processor" => Ok(AssetKind::Processor),
            "endpoint" => Ok(AssetKind::Endpoint),
            other => Err(Error::NotSupported {
                what: format!("asset kind '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Where the target endpoint of an attach comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEndpointMode {
    /// The asset is itself the target endpoint
    AssetIsEndpoint,
    /// Reuse the asset's endpoint or create one on the fabric manager
    FindOrCreate,
}

type FabricLookup = fn(&ResourceGraph, &Resource) -> Option<ResourceId>;
type ProtocolLookup = fn(&ResourceGraph, &Resource) -> Option<Protocol>;
type KindRules = fn(&ResourceGraph, &ComputerSystem, &Resource, &mut Violations);

pub struct AttachStrategy {
    pub kind: AssetKind,
    fabric_of: FabricLookup,
    protocol_of: ProtocolLookup,
    kind_violations: KindRules,
    pub target_endpoint: TargetEndpointMode,
    /// Also link the processors, volumes and drives behind the target endpoint
    pub links_connected_assets: bool,
}

impl std::fmt::Debug for AttachStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachStrategy")
            .field("kind", &self.kind)
            .field("target_endpoint", &self.target_endpoint)
            .field("links_connected_assets", &self.links_connected_assets)
            .finish()
    }
}

impl AttachStrategy {
    pub fn fabric_of(&self, graph: &ResourceGraph, asset: &Resource) -> Option<ResourceId> {
        (self.fabric_of)(graph, asset)
    }

    pub fn protocol_of(&self, graph: &ResourceGraph, asset: &Resource) -> Option<Protocol> {
        (self.protocol_of)(graph, asset)
    }

    /// Check that `asset` may be attached to `node`.
    ///
    /// A missing node, or a node without a computer system, fails
    /// immediately. Everything about the asset itself is accumulated and
    /// reported as one `Error::Validation`.
    pub fn validate(
        &self,
        graph: &ResourceGraph,
        node: &ResourceId,
        asset: &ResourceId,
        requested_protocol: Option<Protocol>,
    ) -> Result<()> {
        let system = owning_system(graph, node)?;
        let mut violations = Violations::new();

        let resource = match graph.resource(asset) {
            Some(resource) => resource,
            None => {
                violations.add(format!("Specified resource ({}) does not exist.", asset));
                return violations.into_validation_result();
            }
        };
        if AssetKind::of(resource).ok() != Some(self.kind) {
            violations.add(format!(
                "Specified resource ({}) is not a {}.",
                asset, self.kind
            ));
            return violations.into_validation_result();
        }

        if let Some((status, allocated)) = attach_state(resource) {
            violations.add_if(
                !status.is_enabled_and_healthy(),
                format!(
                    "Selected {} is not achievable: it is not enabled or not healthy.",
                    self.kind
                ),
            );
            violations.add_if(
                allocated,
                format!("Selected {} is already allocated.", self.kind),
            );
        }

        let own_protocol = self.protocol_of(graph, resource);
        match (requested_protocol, own_protocol) {
            (Some(requested), _) if !requested.is_attachable() => {
                violations.add(unsupported_protocol(requested));
            }
            (Some(requested), Some(own)) if requested != own => {
                violations.add(format!(
                    "Requested protocol {} does not match {} protocol {}.",
                    requested, self.kind, own
                ));
            }
            (None, Some(own)) if !own.is_attachable() => {
                violations.add(unsupported_protocol(own));
            }
            (None, None) => {
                violations.add(format!(
                    "Cannot determine protocol of {} {}.",
                    self.kind, asset
                ));
            }
            _ => {}
        }

        (self.kind_violations)(graph, system, resource, &mut violations);

        if violations.has_violations() {
            debug!(
                "Attach of {} to {} rejected with {} violation(s)",
                asset,
                node,
                violations.len()
            );
        }
        violations.into_validation_result()
    }

    /// Operation context for a validated attach
    pub fn context(
        &self,
        graph: &ResourceGraph,
        node: &ResourceId,
        asset: &ResourceId,
        requested_protocol: Option<Protocol>,
    ) -> Result<AttachOperationContext> {
        let system = owning_system(graph, node)?;
        let resource = graph
            .resource(asset)
            .ok_or_else(|| Error::not_found(self.kind.as_str(), asset))?;

        let fabric = self
            .fabric_of(graph, resource)
            .ok_or_else(|| Error::state_mismatch(asset, "Cannot determine the fabric of the asset"))?;
        let protocol = requested_protocol
            .or_else(|| self.protocol_of(graph, resource))
            .ok_or_else(|| {
                Error::state_mismatch(asset, "Cannot determine the protocol of the asset")
            })?;

        Ok(AttachOperationContext {
            kind: self.kind,
            fabric,
            protocol,
            node: node.clone(),
            asset: asset.clone(),
            system: system.id.clone(),
            system_uuid: system.uuid,
        })
    }
}

fn unsupported_protocol(protocol: Protocol) -> String {
    let supported: Vec<String> = Protocol::ATTACHABLE.iter().map(|p| p.to_string()).collect();
    format!(
        "Protocol {} is not supported for attach, use one of: {}.",
        protocol,
        supported.join(", ")
    )
}

fn owning_system<'a>(graph: &'a ResourceGraph, node: &ResourceId) -> Result<&'a ComputerSystem> {
    let node = graph.resolve::<ComposedNode>(node)?;
    let system = node
        .system
        .as_ref()
        .ok_or_else(|| Error::state_mismatch(&node.id, "Composed node has no computer system"))?;
    graph.resolve::<ComputerSystem>(system)
}

/// Status and allocation flag of an attachable resource
fn attach_state(resource: &Resource) -> Option<(Status, bool)> {
    match resource {
        Resource::Drive(d) => Some((d.status, d.allocated)),
        Resource::Volume(v) => Some((v.status, v.allocated)),
        Resource::Processor(p) => Some((p.status, p.allocated)),
        Resource::Endpoint(e) => Some((e.status, e.composed_node.is_some())),
        _ => None,
    }
}

// =============================================================================
// Fabric and Protocol Lookups
// =============================================================================

/// Fabric of an existing endpoint for `asset`, else of the PCIe switch
/// housed over its chassis
fn fabric_via_topology(
    graph: &ResourceGraph,
    asset: &ResourceId,
    chassis: Option<&ResourceId>,
) -> Option<ResourceId> {
    graph
        .endpoints_linking(asset)
        .find_map(|e| e.fabric.clone())
        .or_else(|| {
            chassis.and_then(|c| {
                graph
                    .switches_over_chassis(c)
                    .into_iter()
                    .find_map(|s| s.fabric.clone())
            })
        })
}

fn drive_fabric(graph: &ResourceGraph, asset: &Resource) -> Option<ResourceId> {
    match asset {
        Resource::Drive(d) => fabric_via_topology(graph, &d.id, d.chassis.as_ref()),
        _ => None,
    }
}

fn processor_fabric(graph: &ResourceGraph, asset: &Resource) -> Option<ResourceId> {
    match asset {
        Resource::Processor(p) => fabric_via_topology(graph, &p.id, p.chassis.as_ref()),
        _ => None,
    }
}

fn volume_fabric(_: &ResourceGraph, asset: &Resource) -> Option<ResourceId> {
    match asset {
        Resource::Volume(v) => v.fabric.clone(),
        _ => None,
    }
}

fn endpoint_fabric(_: &ResourceGraph, asset: &Resource) -> Option<ResourceId> {
    match asset {
        Resource::Endpoint(e) => e.fabric.clone(),
        _ => None,
    }
}

fn drive_protocol(_: &ResourceGraph, asset: &Resource) -> Option<Protocol> {
    match asset {
        Resource::Drive(d) => d.protocol,
        _ => None,
    }
}

fn processor_protocol(_: &ResourceGraph, asset: &Resource) -> Option<Protocol> {
    match asset {
        Resource::Processor(p) => p.protocol,
        _ => None,
    }
}

/// Volumes are exported with the protocol of their fabric
fn volume_protocol(graph: &ResourceGraph, asset: &Resource) -> Option<Protocol> {
    match asset {
        Resource::Volume(v) => v
            .fabric
            .as_ref()
            .and_then(|f| graph.get::<Fabric>(f))
            .and_then(|f| f.protocol),
        _ => None,
    }
}

fn endpoint_protocol(_: &ResourceGraph, asset: &Resource) -> Option<Protocol> {
    match asset {
        Resource::Endpoint(e) => e.protocol,
        _ => None,
    }
}

// =============================================================================
// Kind Rules
// =============================================================================

fn drive_rules(
    graph: &ResourceGraph,
    system: &ComputerSystem,
    asset: &Resource,
    violations: &mut Violations,
) {
    let Resource::Drive(drive) = asset else {
        return;
    };
    let achievable = graph
        .achievable_pcie_drives(system)
        .iter()
        .any(|d| d.id == drive.id);
    let remote = drive.protocol == Some(Protocol::NvmeOverFabrics);
    violations.add_if(
        !(achievable || remote),
        format!(
            "Selected drive is neither achievable over PCIe from computer system {} nor a remote drive.",
            system.id
        ),
    );
    violations.add_if(
        graph.has_fully_used_endpoints(&drive.id),
        "All endpoints of the selected drive are already in use.",
    );
}

fn volume_rules(
    graph: &ResourceGraph,
    _: &ComputerSystem,
    asset: &Resource,
    violations: &mut Violations,
) {
    if let Resource::Volume(volume) = asset {
        violations.add_if(
            graph.has_fully_used_endpoints(&volume.id),
            "All endpoints of the selected volume are already in use.",
        );
    }
}

fn processor_rules(
    graph: &ResourceGraph,
    system: &ComputerSystem,
    asset: &Resource,
    violations: &mut Violations,
) {
    let Resource::Processor(processor) = asset else {
        return;
    };
    violations.add_if(!processor.is_fpga(), "Selected processor is not an FPGA.");

    let achievable = graph
        .achievable_pcie_processors(system)
        .iter()
        .any(|p| p.id == processor.id);
    let over_fabrics = processor.protocol == Some(Protocol::FpgaOverFabrics);
    violations.add_if(
        !(achievable || over_fabrics),
        format!(
            "Selected processor is not achievable from computer system {}.",
            system.id
        ),
    );
}

fn endpoint_rules(
    _: &ResourceGraph,
    _: &ComputerSystem,
    asset: &Resource,
    violations: &mut Violations,
) {
    if let Resource::Endpoint(endpoint) = asset {
        violations.add_if(
            endpoint.linked_entities().next().is_none(),
            "Selected endpoint has no connected entities.",
        );
        violations.add_if(
            !endpoint.is_target(),
            "Selected endpoint is not a target endpoint.",
        );
    }
}

// =============================================================================
// Registry
// =============================================================================

static STRATEGIES: [AttachStrategy; 4] = [
    AttachStrategy {
        kind: AssetKind::Drive,
        fabric_of: drive_fabric,
        protocol_of: drive_protocol,
        kind_violations: drive_rules,
        target_endpoint: TargetEndpointMode::FindOrCreate,
        links_connected_assets: false,
    },
    AttachStrategy {
        kind: AssetKind::Volume,
        fabric_of: volume_fabric,
        protocol_of: volume_protocol,
        kind_violations: volume_rules,
        target_endpoint: TargetEndpointMode::FindOrCreate,
        links_connected_assets: false,
    },
    AttachStrategy {
        kind: AssetKind::Processor,
        fabric_of: processor_fabric,
        protocol_of: processor_protocol,
        kind_violations: processor_rules,
        target_endpoint: TargetEndpointMode::FindOrCreate,
        links_connected_assets: false,
    },
    AttachStrategy {
        kind: AssetKind::Endpoint,
        fabric_of: endpoint_fabric,
        protocol_of: endpoint_protocol,
        kind_violations: endpoint_rules,
        target_endpoint: TargetEndpointMode::AssetIsEndpoint,
        links_connected_assets: true,
    },
];

pub struct AttachStrategyRegistry;

impl AttachStrategyRegistry {
    pub fn strategy_for(kind: AssetKind) -> Result<&'static AttachStrategy> {
        STRATEGIES
            .iter()
            .find(|s| s.kind == kind)
            .ok_or_else(|| Error::NotSupported {
                what: format!("attaching assets of kind {}", kind),
            })
    }

    pub fn strategy_for_resource(resource: &Resource) -> Result<&'static AttachStrategy> {
        Self::strategy_for(AssetKind::of(resource)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConnectedEntity, Drive, Endpoint, EntityRole, Health, ProcessorType, Processor, State,
        Volume,
    };
    use crate::store::topology::fixtures::pcie_pod;
    use assert_matches::assert_matches;

    fn pod_with_node() -> ResourceGraph {
        let mut graph = pcie_pod();
        let mut node = ComposedNode::new("/nodes/1");
        node.system = Some("/systems/1".into());
        graph.insert(node);
        graph.insert(ComposedNode::new("/nodes/empty"));
        graph
    }

    fn violations_of(result: Result<()>) -> Vec<String> {
        match result {
            Err(Error::Validation(v)) => v.iter().cloned().collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_has_a_strategy() {
        for kind in AssetKind::ALL {
            assert_eq!(AttachStrategyRegistry::strategy_for(kind).unwrap().kind, kind);
        }
        assert_eq!(
            AttachStrategyRegistry::strategy_for(AssetKind::Endpoint)
                .unwrap()
                .target_endpoint,
            TargetEndpointMode::AssetIsEndpoint
        );
    }

    #[test]
    fn test_unsupported_kinds() {
        assert_matches!("switch".parse::<AssetKind>(), Err(Error::NotSupported { .. }));
        assert_eq!("Drive".parse::<AssetKind>().unwrap(), AssetKind::Drive);

        let graph = pcie_pod();
        let system = graph.resource(&"/systems/1".into()).unwrap();
        assert_matches!(
            AttachStrategyRegistry::strategy_for_resource(system),
            Err(Error::NotSupported { .. })
        );
    }

    #[test]
    fn test_achievable_drive_is_valid() {
        let graph = pod_with_node();
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();

        assert!(strategy
            .validate(&graph, &"/nodes/1".into(), &"/chassis/drawer/drives/1".into(), None)
            .is_ok());
        assert!(strategy
            .validate(
                &graph,
                &"/nodes/1".into(),
                &"/chassis/drawer/drives/1".into(),
                Some(Protocol::Nvme)
            )
            .is_ok());
    }

    #[test]
    fn test_drive_violations_accumulate() {
        let mut graph = pod_with_node();
        graph.insert(Drive {
            id: "/chassis/drawer/drives/1".into(),
            chassis: Some("/chassis/drawer".into()),
            protocol: Some(Protocol::Nvme),
            status: Status::new(State::Enabled, Health::Critical),
            allocated: true,
            ..Default::default()
        });
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();

        let violations = violations_of(strategy.validate(
            &graph,
            &"/nodes/1".into(),
            &"/chassis/drawer/drives/1".into(),
            Some(Protocol::Pcie),
        ));
        assert_eq!(violations.len(), 3);
        assert!(violations[0].contains("not enabled or not healthy"));
        assert!(violations[1].contains("already allocated"));
        assert!(violations[2].contains("does not match drive protocol NVMe"));
    }

    #[test]
    fn test_unreachable_and_unsupported_drive() {
        let graph = pod_with_node();
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();

        let violations = violations_of(strategy.validate(
            &graph,
            &"/nodes/1".into(),
            &"/chassis/sled/drives/sata1".into(),
            None,
        ));
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("Protocol SATA is not supported"));
        assert!(violations[1].contains("neither achievable over PCIe"));
    }

    #[test]
    fn test_missing_and_mistyped_assets() {
        let graph = pod_with_node();
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();

        let missing = violations_of(strategy.validate(
            &graph,
            &"/nodes/1".into(),
            &"/drives/none".into(),
            None,
        ));
        assert_eq!(missing, vec!["Specified resource (/drives/none) does not exist."]);

        let mistyped = violations_of(strategy.validate(
            &graph,
            &"/nodes/1".into(),
            &"/chassis/drawer/processors/fpga1".into(),
            None,
        ));
        assert!(mistyped[0].contains("is not a drive"));
    }

    #[test]
    fn test_node_problems_fail_fast() {
        let graph = pod_with_node();
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();
        let drive: ResourceId = "/chassis/drawer/drives/1".into();

        assert_matches!(
            strategy.validate(&graph, &"/nodes/none".into(), &drive, None),
            Err(Error::EntityNotFound { .. })
        );
        assert_matches!(
            strategy.validate(&graph, &"/nodes/empty".into(), &drive, None),
            Err(Error::StateMismatch { .. })
        );
    }

    #[test]
    fn test_processor_rules() {
        let mut graph = pod_with_node();
        graph.insert(Processor {
            id: "/systems/1/processors/cpu0".into(),
            system: Some("/systems/1".into()),
            processor_type: Some(ProcessorType::Cpu),
            protocol: Some(Protocol::Pcie),
            ..Default::default()
        });
        graph.insert(Processor {
            id: "/pool/fpga-of/1".into(),
            processor_type: Some(ProcessorType::Fpga),
            protocol: Some(Protocol::FpgaOverFabrics),
            ..Default::default()
        });
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Processor).unwrap();
        let node: ResourceId = "/nodes/1".into();

        assert!(strategy
            .validate(&graph, &node, &"/chassis/drawer/processors/fpga1".into(), None)
            .is_ok());
        assert!(strategy
            .validate(&graph, &node, &"/pool/fpga-of/1".into(), None)
            .is_ok());

        let violations =
            violations_of(strategy.validate(&graph, &node, &"/systems/1/processors/cpu0".into(), None));
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0], "Selected processor is not an FPGA.");
    }

    #[test]
    fn test_endpoint_rules() {
        let mut graph = pod_with_node();
        graph.insert(Endpoint {
            id: "/fabrics/nvme/Endpoints/bare".into(),
            fabric: Some("/fabrics/nvme".into()),
            protocol: Some(Protocol::NvmeOverFabrics),
            connected_entities: vec![ConnectedEntity {
                entity_role: EntityRole::Initiator,
                entity: None,
            }],
            ..Default::default()
        });
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Endpoint).unwrap();

        let violations = violations_of(strategy.validate(
            &graph,
            &"/nodes/1".into(),
            &"/fabrics/nvme/Endpoints/bare".into(),
            None,
        ));
        assert_eq!(
            violations,
            vec![
                "Selected endpoint has no connected entities.",
                "Selected endpoint is not a target endpoint.",
            ]
        );
    }

    #[test]
    fn test_context_for_volume_uses_fabric_protocol() {
        let mut graph = pod_with_node();
        graph.insert(Fabric {
            id: "/fabrics/nvme".into(),
            protocol: Some(Protocol::NvmeOverFabrics),
            ..Default::default()
        });
        graph.insert(Volume {
            id: "/services/1/volumes/1".into(),
            fabric: Some("/fabrics/nvme".into()),
            ..Default::default()
        });
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Volume).unwrap();
        let volume: ResourceId = "/services/1/volumes/1".into();

        assert!(strategy.validate(&graph, &"/nodes/1".into(), &volume, None).is_ok());
        let context = strategy
            .context(&graph, &"/nodes/1".into(), &volume, None)
            .unwrap();
        assert_eq!(context.fabric.as_str(), "/fabrics/nvme");
        assert_eq!(context.protocol, Protocol::NvmeOverFabrics);
        assert_eq!(context.system.as_str(), "/systems/1");
        assert_eq!(context.system_uuid, Some(uuid::Uuid::from_u128(1)));
    }

    #[test]
    fn test_drive_fabric_from_switch_topology() {
        let graph = pod_with_node();
        let strategy = AttachStrategyRegistry::strategy_for(AssetKind::Drive).unwrap();

        let context = strategy
            .context(&graph, &"/nodes/1".into(), &"/chassis/drawer/drives/2".into(), None)
            .unwrap();
        assert_eq!(context.fabric.as_str(), "/fabrics/pcie");
        assert_eq!(context.protocol, Protocol::Nvme);

        assert_matches!(
            strategy.context(&graph, &"/nodes/1".into(), &"/chassis/sled/drives/sata1".into(), None),
            Err(Error::StateMismatch { .. })
        );
    }
}
