//! Pod Composer - Resource Matching and Fabric Attachment
//!
//! Composes logical nodes out of a pod of disaggregated hardware: finds the
//! computer systems able to host a resource request, and wires chosen
//! drives, volumes, FPGAs and endpoints to a node over its fabric.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              pod-composer CLI                               │
//! ├──────────────────────────────────────┬──────────────────────────────────────┤
//! │          Allocation Pipeline         │               Attacher               │
//! │  available -> references -> chassis  │  Strategy (drive/volume/processor/   │
//! │  -> processors -> memory -> storage  │  endpoint) -> validate               │
//! │  -> ethernet -> attributes           │  -> RemoteAttachCoordinator          │
//! │  -> security                         │  -> LocalAttachCommitter (retry)     │
//! ├──────────────────────────────────────┼──────────────────────────────────────┤
//! │   CandidateCollector + topology      │       Fabric manager adapters        │
//! │   (PCIe achievability walks)         │     Redfish (reqwest) / in-memory    │
//! ├──────────────────────────────────────┴──────────────────────────────────────┤
//! │              ResourceGraph snapshot / versioned ResourceStore               │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`allocation`]: Dimension matchers, candidate collection and the pipeline
//! - [`attach`]: Attach strategies, remote coordination and local commit
//! - [`config`]: Composer configuration
//! - [`domain`]: Resource graph entities and port definitions
//! - [`error`]: Error types and handling
//! - [`fabric`]: Fabric manager adapters
//! - [`metrics`]: Prometheus metrics
//! - [`store`]: Resource graph, topology walks and transactions

pub mod allocation;
pub mod attach;
pub mod config;
pub mod domain;
pub mod error;
pub mod fabric;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use allocation::{AllocationOutcome, AllocationPipeline, CandidateCollector, ResourceRequest};

pub use attach::{
    AssetKind, AttachOutcome, AttachStrategyRegistry, AttachableAssets, Attacher,
    LocalAttachCommitter, RemoteAttachCoordinator,
};

pub use config::ComposerConfig;

pub use domain::{
    ComposedNode, ComputerSystem, FabricEndpointService, FabricZoneService, Protocol, ResourceId,
};

pub use error::{Error, Result, StageDiagnostics, Violations};

pub use fabric::{FabricServices, InMemoryFabricManager, RedfishFabricClient};

pub use metrics::ComposerMetrics;

pub use store::{ResourceGraph, ResourceStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
