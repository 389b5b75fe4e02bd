//! Allocation Pipeline
//!
//! A sequential filter chain over candidate systems:
//!
//! ```text
//! available -> resource-references -> chassis-references
//!           -> processors -> memory -> local-storage
//!           -> ethernet-interfaces -> system-attributes -> security
//! ```
//!
//! There is no backtracking: a system either independently satisfies every
//! stage or is dropped. The survivor count of every executed stage is kept
//! for diagnostics.

use super::collector::CandidateCollector;
use super::matcher::{default_matchers, DimensionMatcher};
use super::request::ResourceRequest;
use crate::domain::ComputerSystem;
use crate::error::{Error, Result, StageDiagnostics, Violations};
use crate::store::ResourceGraph;
use serde::Serialize;
use tracing::{debug, info};

pub const STAGE_AVAILABLE: &str = "available";
pub const STAGE_RESOURCE_REFERENCES: &str = "resource-references";
pub const STAGE_CHASSIS_REFERENCES: &str = "chassis-references";

/// Feasible systems with the survivor count of every stage
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome<'a> {
    pub systems: Vec<&'a ComputerSystem>,
    pub diagnostics: StageDiagnostics,
}

impl AllocationOutcome<'_> {
    /// First feasible system, the one a composition would bind to
    pub fn chosen(&self) -> Option<&ComputerSystem> {
        self.systems.first().copied()
    }
}

pub struct AllocationPipeline {
    matchers: Vec<Box<dyn DimensionMatcher>>,
}

impl Default for AllocationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationPipeline {
    pub fn new() -> Self {
        Self::with_matchers(default_matchers())
    }

    pub fn with_matchers(matchers: Vec<Box<dyn DimensionMatcher>>) -> Self {
        Self { matchers }
    }

    /// Stage names in execution order
    pub fn stages(&self) -> Vec<&'static str> {
        [STAGE_AVAILABLE, STAGE_RESOURCE_REFERENCES, STAGE_CHASSIS_REFERENCES]
            .into_iter()
            .chain(self.matchers.iter().map(|m| m.dimension()))
            .collect()
    }

    /// Run the request against every system in the graph
    pub fn matches_all<'a>(
        &self,
        request: &ResourceRequest,
        graph: &'a ResourceGraph,
    ) -> Result<AllocationOutcome<'a>> {
        let systems: Vec<&ComputerSystem> = graph.all::<ComputerSystem>().collect();
        self.matches(request, &systems, graph)
    }

    /// Filter `systems` down to those able to host the request.
    ///
    /// Unresolvable resource references, or references owned by different
    /// systems, fail with `Error::AllocationRequestProcessing`; an empty result, including
    /// disjoint chassis references, fails with `Error::AllocationInfeasible`.
    pub fn matches<'a>(
        &self,
        request: &ResourceRequest,
        systems: &[&'a ComputerSystem],
        graph: &'a ResourceGraph,
    ) -> Result<AllocationOutcome<'a>> {
        let collector = CandidateCollector::new(graph);
        let mut diagnostics = StageDiagnostics::new();

        let mut candidates: Vec<&'a ComputerSystem> = systems
            .iter()
            .copied()
            .filter(|s| s.is_available_for_allocation())
            .collect();
        record(&mut diagnostics, STAGE_AVAILABLE, &candidates)?;

        if request.has_resource_references() {
            let referenced = collector.narrowed_references(request)?;
            candidates.retain(|s| referenced.contains(&s.id));
        }
        record(&mut diagnostics, STAGE_RESOURCE_REFERENCES, &candidates)?;

        if request.has_chassis_references() {
            let common = match collector.collect_by_chassis_references(request) {
                Ok(common) => common,
                Err(Error::AllocationRequestProcessing(violations)) => {
                    return Err(Error::AllocationInfeasible {
                        violations,
                        diagnostics,
                    })
                }
                Err(e) => return Err(e),
            };
            candidates.retain(|s| common.contains(&s.id));
        }
        record(&mut diagnostics, STAGE_CHASSIS_REFERENCES, &candidates)?;

        for matcher in &self.matchers {
            candidates.retain(|s| matcher.matches(request, s, graph));
            record(&mut diagnostics, matcher.dimension(), &candidates)?;
        }

        info!(
            "Request {} is feasible on {} system(s)",
            request.name.as_deref().unwrap_or("<unnamed>"),
            candidates.len()
        );
        Ok(AllocationOutcome {
            systems: candidates,
            diagnostics,
        })
    }
}

/// Record a stage's survivors, failing once nothing survives
fn record(
    diagnostics: &mut StageDiagnostics,
    stage: &str,
    candidates: &[&ComputerSystem],
) -> Result<()> {
    debug!("Stage {}: {} candidate(s) remain", stage, candidates.len());
    diagnostics.insert(stage.to_string(), candidates.len());

    if candidates.is_empty() {
        info!("Allocation infeasible at stage {}", stage);
        return Err(Error::AllocationInfeasible {
            violations: Violations::from(vec![format!(
                "There are no computer systems available matching the {} requirements.",
                stage
            )]),
            diagnostics: std::mem::take(diagnostics),
        });
    }
    Ok(())
}
