//! Store Module
//!
//! The local resource graph: read snapshots for allocation, topology
//! walks for achievability, and versioned transactions for attach commits.

pub mod events;
pub mod graph;
pub mod resource_store;
pub mod topology;

pub use events::*;
pub use graph::*;
pub use resource_store::*;
