//! Contract manifests: the declared interface and policy of a contract.

mod abi;
mod group;
mod permission;
mod wildcard;

pub use abi::{ContractAbi, ContractEvent, ContractMethod, ContractParameter, ContractParameterType};
pub use group::ContractGroup;
pub use permission::{ContractPermission, PermissionDescriptor};
pub use wildcard::WildcardContainer;

use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use serde::{Deserialize, Serialize};

/// Maximum serialized manifest size in bytes.
pub const MAX_MANIFEST_SIZE: usize = 0xFFFF;

/// The JSON document deployed next to a contract's NEF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractManifest {
    pub name: String,
    pub groups: Vec<ContractGroup>,
    /// Reserved; always an empty object.
    #[serde(default)]
    pub features: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "supportedstandards")]
    pub supported_standards: Vec<String>,
    pub abi: ContractAbi,
    pub permissions: Vec<ContractPermission>,
    pub trusts: WildcardContainer<PermissionDescriptor>,
    pub extra: serde_json::Value,
}

impl ContractManifest {
    /// A manifest with one ABI and no permissions beyond calling nothing.
    pub fn new(name: impl Into<String>, abi: ContractAbi) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            features: serde_json::Map::new(),
            supported_standards: Vec::new(),
            abi,
            permissions: Vec::new(),
            trusts: WildcardContainer::List(Vec::new()),
            extra: serde_json::Value::Null,
        }
    }

    /// Parses a manifest from JSON, enforcing the size cap.
    pub fn from_json(json: &str) -> ContractResult<Self> {
        if json.len() > MAX_MANIFEST_SIZE {
            return Err(ContractError::invalid_format(format!(
                "manifest of {} bytes exceeds {MAX_MANIFEST_SIZE}",
                json.len()
            )));
        }
        let manifest: ContractManifest = serde_json::from_str(json)?;
        manifest.validate_structure()?;
        Ok(manifest)
    }

    /// Renders the manifest as canonical JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("manifest serialization cannot fail")
    }

    /// Structural checks independent of the contract hash.
    pub fn validate_structure(&self) -> ContractResult<()> {
        if self.name.is_empty() {
            return Err(ContractError::InvalidManifest("empty name".into()));
        }
        self.abi.validate()?;
        // Permissions must not repeat a target.
        for (i, permission) in self.permissions.iter().enumerate() {
            if self.permissions[..i]
                .iter()
                .any(|other| other.contract == permission.contract)
            {
                return Err(ContractError::InvalidManifest(
                    "duplicate permission target".into(),
                ));
            }
        }
        Ok(())
    }

    /// Whether every group signature endorses `hash`.
    pub fn is_valid_for(&self, hash: &UInt160) -> bool {
        self.groups.iter().all(|group| group.is_valid_for(hash))
    }

    /// Whether a contract with this manifest may call `method` on a target
    /// contract described by `(target_hash, target_manifest)`.
    pub fn can_call(
        &self,
        target_hash: &UInt160,
        target_manifest: &ContractManifest,
        method: &str,
    ) -> bool {
        self.permissions
            .iter()
            .any(|permission| permission.allows(target_hash, target_manifest, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> ContractManifest {
        let abi = ContractAbi {
            methods: vec![ContractMethod {
                name: "test".into(),
                parameters: Vec::new(),
                return_type: ContractParameterType::Any,
                offset: 0,
                safe: true,
            }],
            events: Vec::new(),
        };
        ContractManifest::new("sample", abi)
    }

    #[test]
    fn json_round_trips() {
        let manifest = sample_manifest();
        let json = manifest.to_json();
        let decoded = ContractManifest::from_json(&json).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut manifest = sample_manifest();
        manifest.name.clear();
        let json = manifest.to_json();
        assert!(ContractManifest::from_json(&json).is_err());
    }

    #[test]
    fn duplicate_method_signatures_are_rejected() {
        let mut manifest = sample_manifest();
        let method = manifest.abi.methods[0].clone();
        manifest.abi.methods.push(method);
        let json = manifest.to_json();
        assert!(ContractManifest::from_json(&json).is_err());
    }

    #[test]
    fn no_permissions_means_no_calls() {
        let caller = sample_manifest();
        let callee = sample_manifest();
        assert!(!caller.can_call(&UInt160::ZERO, &callee, "test"));
    }
}
