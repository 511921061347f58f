//! Call permissions: which contracts and methods a contract may invoke.

use super::{ContractManifest, WildcardContainer};
use neo3_core::UInt160;
use neo3_crypto::ECPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// The target of a permission entry: anything, a specific contract, or any
/// contract in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDescriptor {
    Wildcard,
    Hash(UInt160),
    Group(ECPoint),
}

impl PermissionDescriptor {
    /// Whether the descriptor covers the target contract.
    pub fn matches(&self, hash: &UInt160, manifest: &ContractManifest) -> bool {
        match self {
            PermissionDescriptor::Wildcard => true,
            PermissionDescriptor::Hash(allowed) => allowed == hash,
            PermissionDescriptor::Group(allowed) => manifest
                .groups
                .iter()
                .any(|group| &group.pubkey == allowed),
        }
    }
}

impl Serialize for PermissionDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PermissionDescriptor::Wildcard => serializer.serialize_str("*"),
            PermissionDescriptor::Hash(hash) => serializer.serialize_str(&hash.to_string()),
            PermissionDescriptor::Group(pubkey) => serializer.serialize_str(&pubkey.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text == "*" {
            return Ok(PermissionDescriptor::Wildcard);
        }
        // 33-byte compressed keys are 66 hex characters; hashes carry 0x.
        if text.len() == 66 {
            let pubkey = ECPoint::from_hex(&text).map_err(serde::de::Error::custom)?;
            return Ok(PermissionDescriptor::Group(pubkey));
        }
        let hash = UInt160::from_str(&text).map_err(serde::de::Error::custom)?;
        Ok(PermissionDescriptor::Hash(hash))
    }
}

/// One permission entry: a target descriptor and the allowed method names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractPermission {
    pub contract: PermissionDescriptor,
    pub methods: WildcardContainer<String>,
}

impl ContractPermission {
    /// A permission allowing every call.
    pub fn allow_all() -> Self {
        Self {
            contract: PermissionDescriptor::Wildcard,
            methods: WildcardContainer::Wildcard,
        }
    }

    /// Whether this entry permits calling `method` on the target.
    pub fn allows(
        &self,
        target_hash: &UInt160,
        target_manifest: &ContractManifest,
        method: &str,
    ) -> bool {
        self.contract.matches(target_hash, target_manifest)
            && self.methods.contains(&method.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ContractAbi, ContractMethod, ContractParameterType};

    fn manifest(name: &str) -> ContractManifest {
        ContractManifest::new(
            name,
            ContractAbi {
                methods: vec![ContractMethod {
                    name: "test".into(),
                    parameters: Vec::new(),
                    return_type: ContractParameterType::Void,
                    offset: 0,
                    safe: false,
                }],
                events: Vec::new(),
            },
        )
    }

    #[test]
    fn wildcard_allows_everything() {
        let permission = ContractPermission::allow_all();
        assert!(permission.allows(&UInt160::ZERO, &manifest("x"), "anything"));
    }

    #[test]
    fn hash_descriptor_restricts_target() {
        let target = UInt160::from_script(b"target");
        let permission = ContractPermission {
            contract: PermissionDescriptor::Hash(target),
            methods: WildcardContainer::List(vec!["test".into()]),
        };
        assert!(permission.allows(&target, &manifest("x"), "test"));
        assert!(!permission.allows(&target, &manifest("x"), "other"));
        assert!(!permission.allows(&UInt160::ZERO, &manifest("x"), "test"));
    }

    #[test]
    fn descriptor_json_round_trips() {
        for descriptor in [
            PermissionDescriptor::Wildcard,
            PermissionDescriptor::Hash(UInt160::from_script(b"abc")),
        ] {
            let json = serde_json::to_string(&descriptor).unwrap();
            let decoded: PermissionDescriptor = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, descriptor);
        }
    }
}
