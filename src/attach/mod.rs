//! Attach Module
//!
//! Wires a chosen asset to a composed node over its fabric:
//! - Strategy: per-kind validation and lookups, selected by asset kind
//! - Remote: idempotent find-or-create of endpoints and zone
//! - Commit: transactional local commit with bounded retry
//! - Attachable: what a node could attach right now

pub mod attachable;
pub mod attacher;
pub mod commit;
pub mod context;
pub mod lookup;
pub mod remote;
pub mod retry;
pub mod strategy;

pub use attachable::{AttachableAsset, AttachableAssets};
pub use attacher::{AttachOutcome, Attacher};
pub use commit::LocalAttachCommitter;
pub use context::{AttachOperationContext, Resolution, ResolvedAttachment, ResolvedId};
pub use lookup::EndpointLookup;
pub use remote::RemoteAttachCoordinator;
pub use retry::retry_on_conflict;
pub use strategy::{AssetKind, AttachStrategy, AttachStrategyRegistry, TargetEndpointMode};
