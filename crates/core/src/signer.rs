//! Signer: an account whose witness authorizes a transaction.

use crate::witness_rule::deserialize_rules;
use crate::{UInt160, WitnessRule, WitnessScopes};
use neo3_config::MAX_SUBITEMS;
use neo3_crypto::ECPoint;
use neo3_io::{var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// An account, the scope of its witness, and the scope's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    /// The account whose witness this is.
    pub account: UInt160,
    /// Where the witness is considered valid.
    pub scopes: WitnessScopes,
    /// Contracts the witness covers; meaningful under `CUSTOM_CONTRACTS`.
    pub allowed_contracts: Vec<UInt160>,
    /// Groups the witness covers; meaningful under `CUSTOM_GROUPS`.
    pub allowed_groups: Vec<ECPoint>,
    /// Rule tree; meaningful under `WITNESS_RULES`.
    pub rules: Vec<WitnessRule>,
}

impl Signer {
    /// Creates a signer with the given scope and no scope parameters.
    pub fn new(account: UInt160, scopes: WitnessScopes) -> Self {
        Self {
            account,
            scopes,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// A signer whose witness only covers the entry script.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self::new(account, WitnessScopes::CALLED_BY_ENTRY)
    }

    /// A signer whose witness is valid everywhere.
    pub fn global(account: UInt160) -> Self {
        Self::new(account, WitnessScopes::GLOBAL)
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = 20 + 1;
        if self.scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            size += var_size(self.allowed_contracts.len() as u64) + self.allowed_contracts.len() * 20;
        }
        if self.scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            size += var_size(self.allowed_groups.len() as u64) + self.allowed_groups.len() * 33;
        }
        if self.scopes.contains(WitnessScopes::WITNESS_RULES) {
            size += var_size(self.rules.len() as u64)
                + self.rules.iter().map(Serializable::size).sum::<usize>();
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.account.serialize(writer)?;
        writer.write_u8(self.scopes.bits())?;
        if self.scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            writer.write_serializable_list(&self.allowed_contracts)?;
        }
        if self.scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64)?;
            for group in &self.allowed_groups {
                writer.write_bytes(group.as_bytes())?;
            }
        }
        if self.scopes.contains(WitnessScopes::WITNESS_RULES) {
            writer.write_serializable_list(&self.rules)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let account = UInt160::deserialize(reader)?;
        let scopes = WitnessScopes::from_byte(reader.read_u8()?)
            .map_err(|e| IoError::invalid_format(e.to_string()))?;

        let allowed_contracts = if scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            neo3_io::helper::deserialize_list(reader, MAX_SUBITEMS)?
        } else {
            Vec::new()
        };
        let allowed_groups = if scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                let bytes = reader.read_bytes(33)?;
                groups.push(
                    ECPoint::from_bytes(&bytes)
                        .map_err(|_| IoError::invalid_format("invalid group key in signer"))?,
                );
            }
            groups
        } else {
            Vec::new()
        };
        let rules = if scopes.contains(WitnessScopes::WITNESS_RULES) {
            deserialize_rules(reader)?
        } else {
            Vec::new()
        };

        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn minimal_signer_round_trips() {
        let signer = Signer::called_by_entry(UInt160::from_script(b"\x51"));
        assert_eq!(Signer::from_array(&signer.to_array()).unwrap(), signer);
    }

    #[test]
    fn custom_contracts_round_trip() {
        let mut signer = Signer::new(
            UInt160::from_script(b"\x52"),
            WitnessScopes::CALLED_BY_ENTRY | WitnessScopes::CUSTOM_CONTRACTS,
        );
        signer.allowed_contracts = vec![UInt160::from_script(b"\x53"), UInt160::from_script(b"\x54")];
        assert_eq!(Signer::from_array(&signer.to_array()).unwrap(), signer);
    }

    #[test]
    fn scope_lists_are_skipped_when_flag_absent() {
        // allowed_contracts without the CustomContracts flag must not be encoded.
        let mut signer = Signer::global(UInt160::ZERO);
        signer.allowed_contracts = vec![UInt160::ZERO];
        let decoded = Signer::from_array(&signer.to_array()).unwrap();
        assert!(decoded.allowed_contracts.is_empty());
    }
}
