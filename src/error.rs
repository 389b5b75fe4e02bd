//! Error types for the pod composer
//!
//! Provides structured error types for request matching, fabric attachment,
//! the local resource store, and the fabric manager adapters.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Violations
// =============================================================================

/// Accumulated, human-readable reasons a request or resource was rejected.
///
/// Collection and validation never stop at the first problem; every check
/// appends here so callers receive the complete list in one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, violation: impl Into<String>) {
        self.0.push(violation.into());
    }

    /// Append `violation` when `condition` holds.
    pub fn add_if(&mut self, condition: bool, violation: impl Into<String>) {
        if condition {
            self.add(violation);
        }
    }

    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    pub fn has_violations(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Fail with `Error::Validation` if anything was recorded.
    pub fn into_validation_result(self) -> Result<()> {
        if self.has_violations() {
            Err(Error::Validation(self))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join("; "))
    }
}

impl From<Vec<String>> for Violations {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl From<&str> for Violations {
    fn from(v: &str) -> Self {
        Self(vec![v.to_string()])
    }
}

/// Survivor count per pipeline stage, in stage order.
pub type StageDiagnostics = IndexMap<String, usize>;

// =============================================================================
// Error
// =============================================================================

/// Unified error type for the composer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Resource Resolution Errors
    // =========================================================================
    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: String, id: String },

    #[error("Not supported: {what}")]
    NotSupported { what: String },

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(Violations),

    #[error("Allocation request processing failed: {0}")]
    AllocationRequestProcessing(Violations),

    #[error("Resource {resource} is not in an attachable state: {reason}")]
    StateMismatch { resource: String, reason: String },

    #[error("No computer system satisfies the request: {violations}")]
    AllocationInfeasible {
        violations: Violations,
        diagnostics: StageDiagnostics,
    },

    // =========================================================================
    // Fabric Manager Errors
    // =========================================================================
    #[error("Fabric manager rejected {operation}: {reason}")]
    RemoteConflict { operation: String, reason: String },

    #[error("Fabric manager operation {operation} failed: {reason}")]
    RemoteOperation { operation: String, reason: String },

    #[error("Fabric manager connection error: {0}")]
    RemoteHttp(#[from] reqwest::Error),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    #[error("Concurrent modification of {resource}")]
    CommitConflict { resource: String },

    #[error("Local commit rolled back after {attempts} attempts: {reason}")]
    TransientCommit { attempts: u32, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Metrics encoding error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Error::EntityNotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn state_mismatch(resource: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::StateMismatch {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::RemoteOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the local commit may be re-executed after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CommitConflict { .. })
    }

    /// Check if the fabric manager reported that the object already exists
    pub fn is_remote_conflict(&self) -> bool {
        matches!(self, Error::RemoteConflict { .. })
    }

    /// Check if this error originated at the fabric manager
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteConflict { .. } | Error::RemoteOperation { .. } | Error::RemoteHttp(_)
        )
    }

    /// Violations carried by this error, if it carries any
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            Error::Validation(v) | Error::AllocationRequestProcessing(v) => Some(v),
            Error::AllocationInfeasible { violations, .. } => Some(violations),
            _ => None,
        }
    }
}

/// Result type alias for the composer
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_accumulate() {
        let mut violations = Violations::new();
        assert!(!violations.has_violations());

        violations.add("first");
        violations.add_if(false, "skipped");
        violations.add_if(true, "second");

        assert_eq!(violations.len(), 2);
        assert_eq!(violations.to_string(), "[first; second]");
        assert!(violations.clone().into_validation_result().is_err());
        assert!(Violations::new().into_validation_result().is_ok());
    }

    #[test]
    fn test_error_retryable() {
        let conflict = Error::CommitConflict {
            resource: "/redfish/v1/Fabrics/1/Zones/1".into(),
        };
        assert!(conflict.is_retryable());

        let remote = Error::remote("create zone", "boom");
        assert!(!remote.is_retryable());
        assert!(remote.is_remote());
        assert!(!remote.is_remote_conflict());

        let exhausted = Error::TransientCommit {
            attempts: 3,
            reason: "conflict".into(),
        };
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn test_violations_exposed() {
        let err = Error::AllocationInfeasible {
            violations: Violations::from("no system"),
            diagnostics: StageDiagnostics::new(),
        };
        assert_eq!(err.violations().map(|v| v.len()), Some(1));
        assert!(Error::Internal("x".into()).violations().is_none());
    }
}
