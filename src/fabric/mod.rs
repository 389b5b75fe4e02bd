//! Fabric Manager Adapters
//!
//! Implementations of the endpoint and zone ports:
//! - Redfish: HTTP client for a Redfish-style fabric manager
//! - Memory: in-process simulation used by `--simulate` and tests

pub mod memory;
pub mod redfish;

pub use memory::*;
pub use redfish::*;

use crate::config::FabricConfig;
use crate::domain::{FabricEndpointServiceRef, FabricZoneServiceRef};
use crate::error::{Error, Result};
use crate::store::ResourceGraph;
use std::fmt;
use std::sync::Arc;

/// The endpoint and zone services of one fabric manager
#[derive(Clone)]
pub struct FabricServices {
    pub endpoints: FabricEndpointServiceRef,
    pub zones: FabricZoneServiceRef,
}

impl fmt::Debug for FabricServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FabricServices").finish_non_exhaustive()
    }
}

impl FabricServices {
    /// Both ports served by one adapter
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: crate::domain::FabricEndpointService + crate::domain::FabricZoneService + 'static,
    {
        Self {
            endpoints: adapter.clone(),
            zones: adapter,
        }
    }

    /// Create the adapter named by `config.adapter`.
    ///
    /// The memory adapter starts from the endpoints and zones in `seed`.
    pub fn create(config: &FabricConfig, seed: &ResourceGraph) -> Result<Self> {
        match config.adapter.to_lowercase().as_str() {
            "redfish" => Ok(Self::from_adapter(Arc::new(RedfishFabricClient::new(
                config.clone(),
            )?))),
            "memory" | "simulate" => Ok(Self::from_adapter(Arc::new(
                InMemoryFabricManager::from_graph(seed),
            ))),
            other => Err(Error::NotSupported {
                what: format!("fabric adapter {}", other),
            }),
        }
    }
}
