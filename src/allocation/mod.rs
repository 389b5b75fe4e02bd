//! Allocation
//!
//! Read-only matching of a [`ResourceRequest`] against the pod inventory.
//! Nothing here mutates the graph, so any number of requests may be
//! evaluated concurrently against shared snapshots.

pub mod collector;
pub mod matcher;
pub mod pipeline;
pub mod request;

pub use collector::CandidateCollector;
pub use matcher::{default_matchers, DimensionMatcher, LocalStorageItem};
pub use pipeline::{AllocationOutcome, AllocationPipeline};
pub use request::*;
