//! Resource Graph
//!
//! An immutable-by-convention snapshot of every pod entity, keyed by
//! identifier. Allocation runs against a snapshot; attach commits go
//! through [`super::ResourceStore`] transactions.

use crate::domain::{
    Chassis, ComposedNode, ComputerSystem, Drive, Endpoint, Entity, EntityResolver, EntityStore,
    EthernetInterface, Memory, Port, Processor, Resource, ResourceId, SimpleStorage, Storage,
    Switch,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// In-memory pod inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Resource>", into = "Vec<Resource>")]
pub struct ResourceGraph {
    resources: BTreeMap<ResourceId, Resource>,
}

impl From<Vec<Resource>> for ResourceGraph {
    fn from(resources: Vec<Resource>) -> Self {
        Self::from_resources(resources)
    }
}

impl From<ResourceGraph> for Vec<Resource> {
    fn from(graph: ResourceGraph) -> Self {
        graph.resources.into_values().collect()
    }
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            graph.upsert(resource);
        }
        graph
    }

    /// Parse an inventory document (a YAML or JSON list of tagged resources)
    pub fn from_yaml_str(inventory: &str) -> Result<Self> {
        let resources: Vec<Resource> = serde_yaml::from_str(inventory)?;
        Ok(Self::from_resources(resources))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let graph = Self::from_yaml_str(&contents)?;
        debug!("Loaded {} resources from {}", graph.len(), path.display());
        Ok(graph)
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Insert or replace, returning the previous value
    pub fn upsert(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.id().clone(), resource)
    }

    pub fn insert<T: Entity>(&mut self, entity: T) -> Option<Resource> {
        self.upsert(entity.into_resource())
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get<T: Entity>(&self, id: &ResourceId) -> Option<&T> {
        self.resources.get(id).and_then(T::from_resource)
    }

    pub fn all<T: Entity>(&self) -> impl Iterator<Item = &T> {
        self.resources.values().filter_map(T::from_resource)
    }

    // =========================================================================
    // Ownership walks
    // =========================================================================

    pub fn processors_of<'a>(&'a self, system: &'a ResourceId) -> impl Iterator<Item = &'a Processor> {
        self.all::<Processor>()
            .filter(move |p| p.system.as_ref() == Some(system))
    }

    pub fn memory_of<'a>(&'a self, system: &'a ResourceId) -> impl Iterator<Item = &'a Memory> {
        self.all::<Memory>()
            .filter(move |m| m.system.as_ref() == Some(system))
    }

    pub fn ethernet_interfaces_of<'a>(
        &'a self,
        system: &'a ResourceId,
    ) -> impl Iterator<Item = &'a EthernetInterface> {
        self.all::<EthernetInterface>()
            .filter(move |e| e.system.as_ref() == Some(system))
    }

    pub fn simple_storages_of<'a>(
        &'a self,
        system: &'a ResourceId,
    ) -> impl Iterator<Item = &'a SimpleStorage> {
        self.all::<SimpleStorage>()
            .filter(move |s| s.system.as_ref() == Some(system))
    }

    pub fn storages_of<'a>(&'a self, system: &'a ResourceId) -> impl Iterator<Item = &'a Storage> {
        self.all::<Storage>()
            .filter(move |s| s.system.as_ref() == Some(system))
    }

    pub fn drives_of_storage<'a>(
        &'a self,
        storage: &'a ResourceId,
    ) -> impl Iterator<Item = &'a Drive> {
        self.all::<Drive>()
            .filter(move |d| d.storage.as_ref() == Some(storage))
    }

    /// System owning a drive through its storage controller
    pub fn storage_owner_of(&self, drive: &Drive) -> Option<&ComputerSystem> {
        let storage = self.get::<Storage>(drive.storage.as_ref()?)?;
        self.get::<ComputerSystem>(storage.system.as_ref()?)
    }

    pub fn node_of_system(&self, system: &ResourceId) -> Option<&ComposedNode> {
        self.all::<ComposedNode>()
            .find(|n| n.system.as_ref() == Some(system))
    }

    // =========================================================================
    // Chassis walks
    // =========================================================================

    /// The chassis itself followed by every chassis it transitively contains
    pub fn chassis_subtree(&self, chassis: &ResourceId) -> BTreeSet<ResourceId> {
        let mut subtree = BTreeSet::new();
        let mut pending = vec![chassis.clone()];
        while let Some(current) = pending.pop() {
            if !subtree.insert(current.clone()) {
                continue;
            }
            pending.extend(
                self.all::<Chassis>()
                    .filter(|c| c.contained_by.as_ref() == Some(&current))
                    .map(|c| c.id.clone()),
            );
        }
        subtree
    }

    /// The chassis itself followed by every chassis containing it
    pub fn chassis_ancestry(&self, chassis: &ResourceId) -> Vec<ResourceId> {
        let mut ancestry = Vec::new();
        let mut current = Some(chassis.clone());
        while let Some(id) = current {
            if ancestry.contains(&id) {
                break;
            }
            current = self
                .get::<Chassis>(&id)
                .and_then(|c| c.contained_by.clone());
            ancestry.push(id);
        }
        ancestry
    }

    pub fn systems_in_chassis(&self, chassis: &ResourceId) -> Vec<&ComputerSystem> {
        let subtree = self.chassis_subtree(chassis);
        self.all::<ComputerSystem>()
            .filter(|s| s.chassis.iter().any(|c| subtree.contains(c)))
            .collect()
    }

    pub fn drives_in_chassis(&self, chassis: &ResourceId) -> Vec<&Drive> {
        let subtree = self.chassis_subtree(chassis);
        self.all::<Drive>()
            .filter(|d| d.chassis.as_ref().is_some_and(|c| subtree.contains(c)))
            .collect()
    }

    pub fn switches_over_chassis(&self, chassis: &ResourceId) -> Vec<&Switch> {
        let ancestry = self.chassis_ancestry(chassis);
        self.all::<Switch>()
            .filter(|s| s.chassis.as_ref().is_some_and(|c| ancestry.contains(c)))
            .collect()
    }

    pub fn ports_of_switch<'a>(&'a self, switch: &'a ResourceId) -> impl Iterator<Item = &'a Port> {
        self.all::<Port>()
            .filter(move |p| p.switch.as_ref() == Some(switch))
    }

    // =========================================================================
    // Endpoint walks
    // =========================================================================

    /// Endpoints whose connected entities reference `asset`
    pub fn endpoints_linking<'a>(
        &'a self,
        asset: &'a ResourceId,
    ) -> impl Iterator<Item = &'a Endpoint> {
        self.all::<Endpoint>().filter(move |e| e.links(asset))
    }

    /// Endpoints acting for `system`; the iterator borrows only the graph
    pub fn endpoints_of_system<'a>(
        &'a self,
        system: &ResourceId,
    ) -> impl Iterator<Item = &'a Endpoint> {
        let system = system.clone();
        self.all::<Endpoint>()
            .filter(move |e| e.system.as_ref() == Some(&system))
    }

    pub fn endpoints_on_fabric<'a>(
        &'a self,
        fabric: &'a ResourceId,
    ) -> impl Iterator<Item = &'a Endpoint> {
        self.all::<Endpoint>().filter(move |e| e.is_on_fabric(fabric))
    }

    /// An asset whose endpoints exist and are all zoned or bound
    pub fn has_fully_used_endpoints(&self, asset: &ResourceId) -> bool {
        let mut endpoints = self.endpoints_linking(asset).peekable();
        endpoints.peek().is_some() && endpoints.all(|e| e.is_in_use())
    }
}

impl EntityResolver for ResourceGraph {
    fn resolve<T: Entity>(&self, id: &ResourceId) -> Result<&T> {
        self.get::<T>(id).ok_or_else(|| Error::not_found(T::KIND, id))
    }
}

impl EntityStore for ResourceGraph {
    fn find<T: Entity>(&self, id: &ResourceId) -> Option<&T> {
        self.get::<T>(id)
    }

    fn find_all<T: Entity>(&self) -> Vec<&T> {
        self.all::<T>().collect()
    }
}
