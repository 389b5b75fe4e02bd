//! Composer Metrics
//!
//! Prometheus counters and gauges kept in a private registry, so several
//! composers (or tests) in one process never collide on metric names.

use crate::error::{Error, Result, StageDiagnostics};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

pub const OUTCOME_FEASIBLE: &str = "feasible";
pub const OUTCOME_INFEASIBLE: &str = "infeasible";
pub const OUTCOME_INVALID: &str = "invalid";

pub struct ComposerMetrics {
    registry: Registry,
    allocation_requests: IntCounterVec,
    stage_survivors: IntGaugeVec,
    attach_operations: IntCounterVec,
    commit_retries: IntCounter,
}

impl ComposerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let allocation_requests = IntCounterVec::new(
            Opts::new(
                "pod_composer_allocation_requests_total",
                "Allocation requests by outcome",
            ),
            &["outcome"],
        )?;
        let stage_survivors = IntGaugeVec::new(
            Opts::new(
                "pod_composer_stage_survivors",
                "Candidate systems left after each pipeline stage of the last request",
            ),
            &["stage"],
        )?;
        let attach_operations = IntCounterVec::new(
            Opts::new(
                "pod_composer_attach_operations_total",
                "Attach operations by asset kind and outcome",
            ),
            &["kind", "outcome"],
        )?;
        let commit_retries = IntCounter::with_opts(Opts::new(
            "pod_composer_commit_retries_total",
            "Local attach commits re-executed after a concurrent modification",
        ))?;

        registry.register(Box::new(allocation_requests.clone()))?;
        registry.register(Box::new(stage_survivors.clone()))?;
        registry.register(Box::new(attach_operations.clone()))?;
        registry.register(Box::new(commit_retries.clone()))?;

        Ok(Self {
            registry,
            allocation_requests,
            stage_survivors,
            attach_operations,
            commit_retries,
        })
    }

    /// Count one allocation request and publish its stage survivors
    pub fn record_allocation(&self, outcome: &str, diagnostics: &StageDiagnostics) {
        self.allocation_requests.with_label_values(&[outcome]).inc();
        self.stage_survivors.reset();
        for (stage, survivors) in diagnostics {
            self.stage_survivors
                .with_label_values(&[stage.as_str()])
                .set(*survivors as i64);
        }
    }

    /// Classify a pipeline result and record it
    pub fn record_allocation_result<T>(&self, result: &Result<T>, diagnostics: Option<&StageDiagnostics>) {
        let outcome = match result {
            Ok(_) => OUTCOME_FEASIBLE,
            Err(Error::AllocationInfeasible { .. }) => OUTCOME_INFEASIBLE,
            Err(_) => OUTCOME_INVALID,
        };
        let empty = StageDiagnostics::new();
        let diagnostics = match (diagnostics, result) {
            (Some(d), _) => d,
            (None, Err(Error::AllocationInfeasible { diagnostics, .. })) => diagnostics,
            (None, _) => &empty,
        };
        self.record_allocation(outcome, diagnostics);
    }

    pub fn record_attach(&self, kind: &str, outcome: &str) {
        self.attach_operations
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn record_commit_retry(&self) {
        self.commit_retries.inc();
    }

    pub fn commit_retries(&self) -> u64 {
        self.commit_retries.get()
    }

    pub fn attach_operations(&self, kind: &str, outcome: &str) -> u64 {
        self.attach_operations.with_label_values(&[kind, outcome]).get()
    }

    pub fn allocation_requests(&self, outcome: &str) -> u64 {
        self.allocation_requests.with_label_values(&[outcome]).get()
    }

    /// Render every metric in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics output is not UTF-8: {}", e)))
    }
}
