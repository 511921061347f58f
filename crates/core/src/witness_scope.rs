//! Witness scopes: where a signer's witness is considered valid.

use crate::{CoreError, CoreResult};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset of scopes attached to a [`crate::Signer`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WitnessScopes(u8);

impl WitnessScopes {
    /// Only valid for fee payment; the witness authorizes nothing else.
    pub const NONE: WitnessScopes = WitnessScopes(0x00);
    /// Valid when the calling contract is the transaction entry script.
    pub const CALLED_BY_ENTRY: WitnessScopes = WitnessScopes(0x01);
    /// Valid inside the contracts listed by the signer.
    pub const CUSTOM_CONTRACTS: WitnessScopes = WitnessScopes(0x10);
    /// Valid inside contracts belonging to the listed groups.
    pub const CUSTOM_GROUPS: WitnessScopes = WitnessScopes(0x20);
    /// Valid where the signer's rule tree allows it.
    pub const WITNESS_RULES: WitnessScopes = WitnessScopes(0x40);
    /// Valid everywhere. Mutually exclusive with every other scope.
    pub const GLOBAL: WitnessScopes = WitnessScopes(0x80);

    const VALID_MASK: u8 = 0x01 | 0x10 | 0x20 | 0x40 | 0x80;

    /// Reconstructs scopes from their wire byte, validating combinations.
    pub fn from_byte(value: u8) -> CoreResult<Self> {
        if value & !Self::VALID_MASK != 0 {
            return Err(CoreError::invalid_format(format!(
                "unknown witness scope bits in {value:#04x}"
            )));
        }
        let scopes = WitnessScopes(value);
        if scopes.contains(Self::GLOBAL) && value != Self::GLOBAL.0 {
            return Err(CoreError::invalid_format(
                "global scope cannot be combined with others",
            ));
        }
        Ok(scopes)
    }

    /// The wire byte.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(&self, other: WitnessScopes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WitnessScopes {
    type Output = WitnessScopes;

    fn bitor(self, rhs: Self) -> Self::Output {
        WitnessScopes(self.0 | rhs.0)
    }
}

impl BitOrAssign for WitnessScopes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for WitnessScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "None");
        }
        let mut names = Vec::new();
        for (scope, name) in [
            (Self::CALLED_BY_ENTRY, "CalledByEntry"),
            (Self::CUSTOM_CONTRACTS, "CustomContracts"),
            (Self::CUSTOM_GROUPS, "CustomGroups"),
            (Self::WITNESS_RULES, "WitnessRules"),
            (Self::GLOBAL, "Global"),
        ] {
            if self.contains(scope) {
                names.push(name);
            }
        }
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_exclusive() {
        assert!(WitnessScopes::from_byte(0x80).is_ok());
        assert!(WitnessScopes::from_byte(0x81).is_err());
    }

    #[test]
    fn unknown_bits_are_rejected() {
        assert!(WitnessScopes::from_byte(0x02).is_err());
        assert!(WitnessScopes::from_byte(0x04).is_err());
    }

    #[test]
    fn combination_round_trips() {
        let scopes = WitnessScopes::CALLED_BY_ENTRY | WitnessScopes::CUSTOM_CONTRACTS;
        assert_eq!(WitnessScopes::from_byte(scopes.bits()).unwrap(), scopes);
        assert!(scopes.contains(WitnessScopes::CALLED_BY_ENTRY));
        assert!(!scopes.contains(WitnessScopes::GLOBAL));
    }
}
