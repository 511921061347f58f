//! Call flags: what a context is allowed to ask of the system.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Bitset restricting the system calls a context may invoke.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: CallFlags = CallFlags(0);
    pub const READ_STATES: CallFlags = CallFlags(0b0000_0001);
    pub const WRITE_STATES: CallFlags = CallFlags(0b0000_0010);
    pub const ALLOW_CALL: CallFlags = CallFlags(0b0000_0100);
    pub const ALLOW_NOTIFY: CallFlags = CallFlags(0b0000_1000);
    pub const STATES: CallFlags = CallFlags(0b0000_0011);
    pub const READ_ONLY: CallFlags = CallFlags(0b0000_0101);
    pub const ALL: CallFlags = CallFlags(0b0000_1111);

    /// Reconstructs flags from their wire byte.
    pub fn from_bits(bits: u8) -> Option<CallFlags> {
        (bits & !Self::ALL.0 == 0).then_some(CallFlags(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `required` is present.
    pub fn contains(&self, required: CallFlags) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitAnd for CallFlags {
    type Output = CallFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        CallFlags(self.0 & rhs.0)
    }
}

impl BitOr for CallFlags {
    type Output = CallFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        CallFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "None");
        }
        if *self == Self::ALL {
            return write!(f, "All");
        }
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::READ_STATES, "ReadStates"),
            (Self::WRITE_STATES, "WriteStates"),
            (Self::ALLOW_CALL, "AllowCall"),
            (Self::ALLOW_NOTIFY, "AllowNotify"),
        ] {
            if self.contains(flag) {
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
    fn combinations() {
        assert!(CallFlags::ALL.contains(CallFlags::STATES));
        assert!(CallFlags::READ_ONLY.contains(CallFlags::READ_STATES));
        assert!(!CallFlags::READ_ONLY.contains(CallFlags::WRITE_STATES));
        assert_eq!(
            CallFlags::READ_STATES | CallFlags::WRITE_STATES,
            CallFlags::STATES
        );
    }

    #[test]
    fn unknown_bits_are_rejected() {
        assert!(CallFlags::from_bits(0b0001_0000).is_none());
        assert_eq!(CallFlags::from_bits(0b0000_1111), Some(CallFlags::ALL));
    }
}
