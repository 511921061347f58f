//! Contract groups: publisher identities endorsing a contract.

use neo3_core::UInt160;
use neo3_crypto::ECPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A group public key plus its signature over the contract hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractGroup {
    pub pubkey: ECPoint,
    pub signature: Vec<u8>,
}

impl ContractGroup {
    /// Whether the signature endorses `hash`.
    pub fn is_valid_for(&self, hash: &UInt160) -> bool {
        self.pubkey.verify_signature(hash.get_span(), &self.signature)
    }
}

#[derive(Serialize, Deserialize)]
struct GroupJson {
    pubkey: String,
    signature: String,
}

impl Serialize for ContractGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        GroupJson {
            pubkey: self.pubkey.to_string(),
            signature: base64::engine::general_purpose::STANDARD.encode(&self.signature),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContractGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use base64::Engine;
        let json = GroupJson::deserialize(deserializer)?;
        let pubkey = ECPoint::from_hex(&json.pubkey).map_err(serde::de::Error::custom)?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(&json.signature)
            .map_err(serde::de::Error::custom)?;
        Ok(ContractGroup { pubkey, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_crypto::KeyPair;

    #[test]
    fn valid_group_signature_verifies() {
        let pair = KeyPair::generate();
        let hash = UInt160::from_script(b"\x51");
        let signature = pair.sign(hash.get_span()).unwrap().to_vec();
        let group = ContractGroup {
            pubkey: *pair.public_key(),
            signature,
        };
        assert!(group.is_valid_for(&hash));
        assert!(!group.is_valid_for(&UInt160::ZERO));
    }

    #[test]
    fn json_round_trips() {
        let pair = KeyPair::generate();
        let group = ContractGroup {
            pubkey: *pair.public_key(),
            signature: vec![1, 2, 3, 4],
        };
        let json = serde_json::to_string(&group).unwrap();
        let decoded: ContractGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, group);
    }
}
