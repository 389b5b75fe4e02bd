//! Dimension Matchers
//!
//! One matcher per resource dimension. Each decides, for a single candidate
//! system, whether the system's pool for that dimension can satisfy every
//! requested item of the dimension. Item-level matching is injective and
//! order-independent (see [`bipartite`]).
//!
//! Field semantics are fixed per field: identities, types, manufacturers
//! and serials compare for equality; capacities, speeds, widths and core
//! counts compare as "available at least requested". A requested `None` is
//! a wildcard, while a requested value against an unknown available value
//! never matches.

pub mod attributes;
pub mod bipartite;
pub mod ethernet;
pub mod local_storage;
pub mod memory;
pub mod processor;
pub mod security;

pub use attributes::SystemAttributesMatcher;
pub use ethernet::EthernetInterfaceMatcher;
pub use local_storage::{LocalStorageItem, LocalStorageMatcher};
pub use memory::MemoryMatcher;
pub use processor::ProcessorMatcher;
pub use security::SecurityAttributesMatcher;

use super::request::ResourceRequest;
use crate::domain::{ComputerSystem, ResourceId};
use crate::store::ResourceGraph;

/// A filter stage over candidate systems
pub trait DimensionMatcher: Send + Sync {
    /// Dimension name, used as the stage name in diagnostics
    fn dimension(&self) -> &'static str;

    fn matches(
        &self,
        request: &ResourceRequest,
        system: &ComputerSystem,
        graph: &ResourceGraph,
    ) -> bool;
}

/// The six dimensions in pipeline order
pub fn default_matchers() -> Vec<Box<dyn DimensionMatcher>> {
    vec![
        Box::new(ProcessorMatcher),
        Box::new(MemoryMatcher),
        Box::new(LocalStorageMatcher),
        Box::new(EthernetInterfaceMatcher),
        Box::new(SystemAttributesMatcher),
        Box::new(SecurityAttributesMatcher),
    ]
}

// =============================================================================
// Field predicates
// =============================================================================

/// Equality, with a requested `None` matching anything
pub(crate) fn exact<T: PartialEq>(requested: &Option<T>, available: &Option<T>) -> bool {
    match requested {
        None => true,
        Some(r) => available.as_ref() == Some(r),
    }
}

/// Explicit resource reference, with a requested `None` matching anything
pub(crate) fn identity(requested: &Option<ResourceId>, available: &ResourceId) -> bool {
    requested.as_ref().map_or(true, |r| r == available)
}

/// Threshold, with a requested `None` matching anything
pub(crate) fn at_least<T: PartialOrd>(requested: &Option<T>, available: &Option<T>) -> bool {
    match (requested, available) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(r), Some(a)) => a >= r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_semantics() {
        assert!(exact::<u32>(&None, &None));
        assert!(exact(&None, &Some("Intel")));
        assert!(exact(&Some("Intel"), &Some("Intel")));
        assert!(!exact(&Some("Intel"), &Some("AMD")));
        assert!(!exact(&Some("Intel"), &None));
    }

    #[test]
    fn test_at_least_semantics() {
        assert!(at_least::<u32>(&None, &None));
        assert!(at_least(&Some(100), &Some(100)));
        assert!(at_least(&Some(100), &Some(101)));
        assert!(!at_least(&Some(100), &Some(99)));
        assert!(!at_least(&Some(100), &None));
    }

    #[test]
    fn test_default_matcher_order() {
        let names: Vec<&str> = default_matchers().iter().map(|m| m.dimension()).collect();
        assert_eq!(
            names,
            vec![
                "processors",
                "memory",
                "local-storage",
                "ethernet-interfaces",
                "system-attributes",
                "security"
            ]
        );
    }
}
