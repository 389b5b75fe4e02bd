//! Domain layer - Resource graph entities and port definitions
//!
//! Entities model the pod as a graph of Redfish-style resources addressed
//! by [`ResourceId`]. Relationships are stored on the owning side only;
//! reverse relations are derived by the store.

pub mod fabric;
pub mod node;
pub mod ports;
pub mod resource;
pub mod storage;
pub mod system;
pub mod types;

pub use fabric::*;
pub use node::*;
pub use ports::*;
pub use resource::*;
pub use storage::*;
pub use system::*;
pub use types::*;
