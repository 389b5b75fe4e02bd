//! Composer Configuration
//!
//! Loaded from a YAML file, or built from defaults; the CLI overrides
//! individual values on top.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

// =============================================================================
// Fabric Manager
// =============================================================================

/// Which fabric manager adapter to use and how to reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// `redfish` or `memory`
    pub adapter: String,
    /// Fabric manager service root, e.g. `https://podm:8443`
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Basic-auth user
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            adapter: "redfish".to_string(),
            base_url: "http://localhost:8443".to_string(),
            request_timeout_secs: 30,
            username: None,
            password: None,
        }
    }
}

// =============================================================================
// Attach
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    /// Bounded retries for the local commit
    pub commit_attempts: u32,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self { commit_attempts: 3 }
    }
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// =============================================================================
// Composer Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub fabric: FabricConfig,
    pub attach: AttachConfig,
    pub logging: LoggingConfig,
}

impl ComposerConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.attach.commit_attempts == 0 {
            return Err(Error::Configuration(
                "attach.commit_attempts must be at least 1".to_string(),
            ));
        }
        if self.fabric.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "fabric.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(self.fabric.base_url.starts_with("http://")
            || self.fabric.base_url.starts_with("https://"))
        {
            return Err(Error::Configuration(format!(
                "fabric.base_url must be an http(s) URL, got {}",
                self.fabric.base_url
            )));
        }
        Ok(())
    }
}
