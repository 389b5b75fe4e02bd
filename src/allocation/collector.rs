//! Candidate Collection
//!
//! Turns the resource and chassis references carried by a request into the
//! systems that own them. Violations are accumulated across every
//! reference before failing, so a caller sees all bad references at once.

use super::request::ResourceRequest;
use crate::domain::{Chassis, ComputerSystem, Resource, ResourceId};
use crate::error::{Error, Result, Violations};
use crate::store::ResourceGraph;
use std::collections::BTreeSet;
use tracing::debug;

pub const CHASSIS_WITHOUT_SYSTEM: &str =
    "Allocation of assets on chassis without computer system is not supported.";
pub const MULTIPLE_CHASSIS: &str = "Allocation of assets on multiple chassis is not supported.";
pub const MULTIPLE_SYSTEMS: &str =
    "Allocation of assets from multiple computer systems is not supported.";

/// Reference resolution over one graph snapshot
pub struct CandidateCollector<'a> {
    graph: &'a ResourceGraph,
}

impl<'a> CandidateCollector<'a> {
    pub fn new(graph: &'a ResourceGraph) -> Self {
        Self { graph }
    }

    // =========================================================================
    // Resource references
    // =========================================================================

    /// Systems owning every directly referenced resource
    pub fn collect_by_resource_references(
        &self,
        request: &ResourceRequest,
    ) -> Result<BTreeSet<ResourceId>> {
        let systems: BTreeSet<ResourceId> = self
            .owners_per_reference(request)?
            .into_iter()
            .flatten()
            .collect();
        debug!("Resource references resolve to {} system(s)", systems.len());
        Ok(systems)
    }

    /// One owner set per reference. A component has a single owner; an NVMe
    /// drive may be served by every system cabled to its switch.
    fn owners_per_reference(
        &self,
        request: &ResourceRequest,
    ) -> Result<Vec<BTreeSet<ResourceId>>> {
        let mut owners = Vec::new();
        let mut violations = Violations::new();

        for reference in request.component_references() {
            match self.graph.resource(reference) {
                None => violations.add(does_not_exist(reference)),
                Some(resource) => match self.owner_of_component(resource) {
                    Some(system) => owners.push(BTreeSet::from([system])),
                    None => violations.add(not_valid(reference)),
                },
            }
        }

        for reference in request.local_drive_references() {
            match self.graph.resource(reference) {
                None => violations.add(does_not_exist(reference)),
                Some(resource) => {
                    let serving: BTreeSet<ResourceId> =
                        self.owners_of_local_drive(resource).into_iter().collect();
                    if serving.is_empty() {
                        violations.add(not_valid(reference));
                    } else {
                        owners.push(serving);
                    }
                }
            }
        }

        if violations.has_violations() {
            return Err(Error::AllocationRequestProcessing(violations));
        }
        Ok(owners)
    }

    fn owner_of_component(&self, resource: &Resource) -> Option<ResourceId> {
        let owner = match resource {
            Resource::Processor(p) => p.system.as_ref(),
            Resource::Memory(m) => m.system.as_ref(),
            Resource::EthernetInterface(e) => e.system.as_ref(),
            Resource::SimpleStorage(s) => s.system.as_ref(),
            _ => None,
        }?;
        self.graph
            .get::<ComputerSystem>(owner)
            .map(|system| system.id.clone())
    }

    /// Simple storage resolves to its system; drives resolve through
    /// [`ResourceGraph::systems_serving_drive`]
    fn owners_of_local_drive(&self, resource: &Resource) -> Vec<ResourceId> {
        match resource {
            Resource::SimpleStorage(_) => self.owner_of_component(resource).into_iter().collect(),
            Resource::Drive(drive) => self
                .graph
                .systems_serving_drive(drive)
                .into_iter()
                .map(|s| s.id.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Chassis references
    // =========================================================================

    /// Systems common to every referenced chassis
    pub fn collect_by_chassis_references(
        &self,
        request: &ResourceRequest,
    ) -> Result<BTreeSet<ResourceId>> {
        let mut violations = Violations::new();
        let mut per_chassis: Vec<BTreeSet<ResourceId>> = Vec::new();

        for chassis in request.component_chassis_references() {
            if self.graph.get::<Chassis>(chassis).is_none() {
                violations.add(does_not_exist(chassis));
                continue;
            }
            per_chassis.push(
                self.graph
                    .systems_in_chassis(chassis)
                    .into_iter()
                    .map(|s| s.id.clone())
                    .collect(),
            );
        }

        for chassis in request.local_drive_chassis_references() {
            if self.graph.get::<Chassis>(chassis).is_none() {
                violations.add(does_not_exist(chassis));
                continue;
            }
            per_chassis.push(
                self.graph
                    .drives_in_chassis(chassis)
                    .into_iter()
                    .flat_map(|drive| self.graph.systems_serving_drive(drive))
                    .map(|s| s.id.clone())
                    .collect(),
            );
        }

        let common = intersect(per_chassis, &mut violations);
        if violations.has_violations() {
            return Err(Error::AllocationRequestProcessing(violations));
        }
        debug!("Chassis references share {} system(s)", common.len());
        Ok(common)
    }

    // =========================================================================
    // Single system
    // =========================================================================

    /// Systems every resource reference can land on.
    ///
    /// References bound to different systems fail with [`MULTIPLE_SYSTEMS`].
    /// A referenced virtual system is replaced by the physical system able
    /// to reach the requested FPGAs.
    pub fn narrowed_references(
        &self,
        request: &ResourceRequest,
    ) -> Result<BTreeSet<ResourceId>> {
        let owners = self.owners_per_reference(request)?;
        let systems: BTreeSet<ResourceId> = owners.iter().flatten().cloned().collect();
        let resolved: Vec<&ComputerSystem> = systems
            .iter()
            .filter_map(|id| self.graph.get::<ComputerSystem>(id))
            .collect();

        if let Some(virtual_system) = resolved.iter().find(|s| s.is_virtual()) {
            let requested_physical = resolved.iter().find(|s| !s.is_virtual()).copied();
            return Ok(self
                .achievable_system(virtual_system, requested_physical, request)
                .map(|s| s.id.clone())
                .into_iter()
                .collect());
        }

        let mut sets = owners.into_iter();
        let Some(first) = sets.next() else {
            return Ok(BTreeSet::new());
        };
        let common: BTreeSet<ResourceId> =
            sets.fold(first, |running, set| running.intersection(&set).cloned().collect());
        if common.is_empty() {
            return Err(Error::AllocationRequestProcessing(MULTIPLE_SYSTEMS.into()));
        }
        debug!("Resource references share {} system(s)", common.len());
        Ok(common)
    }

    /// The one system a reference-bound request must land on
    pub fn resolve_single_system(
        &self,
        request: &ResourceRequest,
    ) -> Result<Option<&'a ComputerSystem>> {
        let systems = self.narrowed_references(request)?;
        if systems.len() > 1 {
            return Err(Error::AllocationRequestProcessing(MULTIPLE_SYSTEMS.into()));
        }
        Ok(systems
            .iter()
            .next()
            .and_then(|id| self.graph.get::<ComputerSystem>(id)))
    }

    fn achievable_system(
        &self,
        virtual_system: &ComputerSystem,
        requested_physical: Option<&'a ComputerSystem>,
        request: &ResourceRequest,
    ) -> Option<&'a ComputerSystem> {
        let fpgas = request.requested_fpga_references();
        let reaches_all = |system: &ComputerSystem| {
            let achievable: BTreeSet<&ResourceId> = self
                .graph
                .achievable_pcie_processors(system)
                .into_iter()
                .map(|p| &p.id)
                .collect();
            fpgas.iter().all(|f| achievable.contains(f))
        };

        if let Some(physical) = requested_physical {
            return reaches_all(physical).then_some(physical);
        }
        self.graph
            .physical_systems_reachable_from(virtual_system)
            .into_iter()
            .find(|s| reaches_all(*s))
    }
}

/// Running intersection. Every empty input set records a violation; the
/// running result going empty records one more, once.
fn intersect(sets: Vec<BTreeSet<ResourceId>>, violations: &mut Violations) -> BTreeSet<ResourceId> {
    let mut common: Option<BTreeSet<ResourceId>> = None;
    let mut disjoint = false;

    for set in sets {
        if set.is_empty() {
            violations.add(CHASSIS_WITHOUT_SYSTEM);
            continue;
        }
        if disjoint {
            continue;
        }
        common = Some(match common {
            None => set,
            Some(running) => {
                let narrowed: BTreeSet<ResourceId> = running.intersection(&set).cloned().collect();
                if narrowed.is_empty() {
                    violations.add(MULTIPLE_CHASSIS);
                    disjoint = true;
                }
                narrowed
            }
        });
    }

    common.unwrap_or_default()
}

fn does_not_exist(reference: &ResourceId) -> String {
    format!("Specified resource ({}) does not exist.", reference)
}

fn not_valid(reference: &ResourceId) -> String {
    format!("Specified resource ({}) is not valid.", reference)
}
