//! Hypervisor capability registry (SPEC_FULL.md §10.5), grounded on
//! `lib/hypervisor.py`'s `GetHypervisor` dispatch and `BaseHypervisor`'s
//! parameter validation contract. No hypervisor is actually driven here
//! — this control plane only needs to know which kinds exist and
//! whether a parameter set is acceptable before handing it to an LU.

use crate::config::entities::ParamSet;
use crate::error::{DbError, PrereqCode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HypervisorKind {
    Fake,
    XenPvm,
    XenHvm,
    Kvm,
}

impl HypervisorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HypervisorKind::Fake => "fake",
            HypervisorKind::XenPvm => "xen-pvm",
            HypervisorKind::XenHvm => "xen-hvm",
            HypervisorKind::Kvm => "kvm",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "fake" => Ok(HypervisorKind::Fake),
            "xen-pvm" => Ok(HypervisorKind::XenPvm),
            "xen-hvm" => Ok(HypervisorKind::XenHvm),
            "kvm" => Ok(HypervisorKind::Kvm),
            other => Err(DbError::prereq(PrereqCode::Inval, format!("Unknown hypervisor type '{other}'"))),
        }
    }

    /// The parameter keys this hypervisor recognizes. Anything else in
    /// a submitted `hvparams` set is rejected by `validate_params`.
    fn known_params(&self) -> &'static [&'static str] {
        match self {
            HypervisorKind::Fake => &[],
            HypervisorKind::XenPvm | HypervisorKind::XenHvm => &["kernel_path", "initrd_path", "root_path", "vcpus"],
            HypervisorKind::Kvm => &["kernel_path", "boot_order", "vcpus", "memory"],
        }
    }

    /// Mirrors `BaseHypervisor.ValidateParameters`: every key must be
    /// known, nothing about values themselves is checked here.
    pub fn validate_params(&self, params: &ParamSet) -> Result<()> {
        let known = self.known_params();
        for key in params.keys() {
            if !known.contains(&key.as_str()) {
                return Err(DbError::prereq(
                    PrereqCode::Inval,
                    format!("Hypervisor parameter '{key}' not supported by {}", self.as_str()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entities::ParamValue;
    use std::collections::BTreeMap;

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(HypervisorKind::parse("bhyve").is_err());
    }

    #[test]
    fn fake_hypervisor_accepts_no_params() {
        let mut params = BTreeMap::new();
        params.insert("vcpus".to_string(), ParamValue::Int(2));
        assert!(HypervisorKind::Fake.validate_params(&params).is_err());
        assert!(HypervisorKind::Fake.validate_params(&BTreeMap::new()).is_ok());
    }

    #[test]
    fn kvm_accepts_known_param() {
        let mut params = BTreeMap::new();
        params.insert("vcpus".to_string(), ParamValue::Int(4));
        assert!(HypervisorKind::Kvm.validate_params(&params).is_ok());
    }
}
