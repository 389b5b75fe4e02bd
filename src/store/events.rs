//! Store Events
//!
//! Events emitted by the resource store for external consumers to react to
//! committed changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the resource store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreEvent {
    /// A resource was written directly, outside a transaction
    ResourceUpserted { id: String, kind: String },

    /// A transaction committed
    TransactionCommitted { revision: u64, written: Vec<String> },

    /// A transaction was rejected because a resource it touched changed
    TransactionConflicted { resource: String },
}

impl std::fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreEvent::ResourceUpserted { id, kind } => write!(f, "upserted {} {}", kind, id),
            StoreEvent::TransactionCommitted { revision, written } => {
                write!(f, "committed r{} ({} resources)", revision, written.len())
            }
            StoreEvent::TransactionConflicted { resource } => {
                write!(f, "conflict on {}", resource)
            }
        }
    }
}
