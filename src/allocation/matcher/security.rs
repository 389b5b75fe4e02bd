//! Security attributes: TPM presence, TPM interface type, and TXT
//!
//! Each requested constraint is checked independently:
//! - `tpm_present = true` needs at least one trusted module, `false` needs none
//! - an interface type needs at least one module of that type
//! - `txt_enabled = true` needs TXT reported enabled; `false` is satisfied
//!   by TXT reported disabled or not reported at all

use super::DimensionMatcher;
use crate::allocation::request::{RequestedSecurity, ResourceRequest};
use crate::domain::ComputerSystem;
use crate::store::ResourceGraph;

impl RequestedSecurity {
    pub fn is_satisfied_by(&self, system: &ComputerSystem) -> bool {
        let modules = &system.trusted_modules;

        let presence = match self.tpm_present {
            None => true,
            Some(true) => !modules.is_empty(),
            Some(false) => modules.is_empty(),
        };

        let interface = match self.tpm_interface_type {
            None => true,
            Some(wanted) => modules.iter().any(|m| m.interface_type == Some(wanted)),
        };

        let txt = match self.txt_enabled {
            None => true,
            Some(true) => system.txt_enabled == Some(true),
            Some(false) => system.txt_enabled != Some(true),
        };

        presence && interface && txt
    }
}

pub struct SecurityAttributesMatcher;

impl DimensionMatcher for SecurityAttributesMatcher {
    fn dimension(&self) -> &'static str {
        "security"
    }

    fn matches(&self, request: &ResourceRequest, system: &ComputerSystem, _graph: &ResourceGraph) -> bool {
        request
            .security
            .as_ref()
            .map_or(true, |security| security.is_satisfied_by(system))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TpmInterfaceType, TrustedModule};

    fn system(modules: &[TpmInterfaceType], txt: Option<bool>) -> ComputerSystem {
        let mut system = ComputerSystem::new("/systems/1");
        system.trusted_modules = modules.iter().map(|t| TrustedModule::of_type(*t)).collect();
        system.txt_enabled = txt;
        system
    }

    fn security(
        tpm_present: Option<bool>,
        tpm_interface_type: Option<TpmInterfaceType>,
        txt_enabled: Option<bool>,
    ) -> RequestedSecurity {
        RequestedSecurity {
            tpm_present,
            tpm_interface_type,
            txt_enabled,
        }
    }

    #[test]
    fn test_tpm_not_present_requires_zero_modules() {
        let request = security(Some(false), None, None);
        assert!(request.is_satisfied_by(&system(&[], None)));
        assert!(!request.is_satisfied_by(&system(&[TpmInterfaceType::Tpm2_0], None)));
    }

    #[test]
    fn test_tpm_present_requires_a_module() {
        let request = security(Some(true), None, None);
        assert!(!request.is_satisfied_by(&system(&[], None)));
        assert!(request.is_satisfied_by(&system(&[TpmInterfaceType::Tpm1_2], None)));
    }

    #[test]
    fn test_interface_type_among_many_modules() {
        let request = security(None, Some(TpmInterfaceType::Tpm2_0), None);
        let mixed = system(
            &[
                TpmInterfaceType::Tpm1_2,
                TpmInterfaceType::Tpm2_0,
                TpmInterfaceType::Tcm1_0,
            ],
            None,
        );
        assert!(request.is_satisfied_by(&mixed));
        assert!(!request.is_satisfied_by(&system(&[TpmInterfaceType::Tpm1_2], None)));
        assert!(!request.is_satisfied_by(&system(&[], None)));
    }

    #[test]
    fn test_interface_type_with_tpm_absent_never_matches() {
        let request = security(Some(false), Some(TpmInterfaceType::Tcm1_0), None);
        assert!(!request.is_satisfied_by(&system(&[TpmInterfaceType::Tcm1_0], None)));
        assert!(!request.is_satisfied_by(&system(&[], None)));
    }

    #[test]
    fn test_txt_rules() {
        let enabled = security(None, None, Some(true));
        let disabled = security(None, None, Some(false));

        assert!(enabled.is_satisfied_by(&system(&[], Some(true))));
        assert!(!enabled.is_satisfied_by(&system(&[], Some(false))));
        assert!(!enabled.is_satisfied_by(&system(&[], None)));

        assert!(disabled.is_satisfied_by(&system(&[], Some(false))));
        assert!(disabled.is_satisfied_by(&system(&[], None)));
        assert!(!disabled.is_satisfied_by(&system(&[], Some(true))));
    }

    #[test]
    fn test_no_security_request_matches_everything() {
        let graph = ResourceGraph::new();
        assert!(SecurityAttributesMatcher.matches(
            &ResourceRequest::default(),
            &system(&[TpmInterfaceType::Tpm2_0], Some(true)),
            &graph
        ));
    }
}
