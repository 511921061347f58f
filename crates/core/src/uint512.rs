// Copyright (C) 2015-2025 The Neo Project.
//
// uint512.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! 512-bit unsigned integer.

use crate::{CoreError, CoreResult};
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// The width of a [`UInt512`] in bytes.
pub const UINT512_SIZE: usize = 64;

/// A 512-bit unsigned integer stored as 8 little-endian `u64` limbs.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct UInt512 {
    limbs: [u64; 8],
}

impl UInt512 {
    /// The zero value.
    pub const ZERO: UInt512 = UInt512 { limbs: [0u64; 8] };

    /// Whether every limb is zero.
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    /// Constructs a value from exactly 64 little-endian bytes.
    pub fn from_bytes(value: &[u8]) -> CoreResult<Self> {
        if value.len() != UINT512_SIZE {
            return Err(CoreError::invalid_format(format!(
                "UInt512 requires 64 bytes, got {}",
                value.len()
            )));
        }
        let mut limbs = [0u64; 8];
        for (i, limb) in limbs.iter_mut().enumerate() {
            *limb = u64::from_le_bytes(
                value[i * 8..(i + 1) * 8]
                    .try_into()
                    .expect("8-byte chunk of a 64-byte slice"),
            );
        }
        Ok(Self { limbs })
    }

    /// The little-endian byte representation.
    pub fn to_array(&self) -> [u8; UINT512_SIZE] {
        let mut bytes = [0u8; UINT512_SIZE];
        for (i, limb) in self.limbs.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_le_bytes());
        }
        bytes
    }

    /// The little-endian bytes, allocated.
    pub fn get_span(&self) -> [u8; UINT512_SIZE] {
        self.to_array()
    }
}

impl From<[u8; UINT512_SIZE]> for UInt512 {
    fn from(bytes: [u8; UINT512_SIZE]) -> Self {
        Self::from_bytes(&bytes).expect("array has the declared width")
    }
}

impl PartialOrd for UInt512 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UInt512 {
    /// Unsigned comparison, walking from the most significant limb down.
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..8).rev() {
            match self.limbs[i].cmp(&other.limbs[i]) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl Hash for UInt512 {
    /// Murmur32 over the canonical little-endian bytes, for determinism
    /// across platforms and runs.
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(neo3_crypto::murmur32(&self.to_array(), 0));
    }
}

impl FromStr for UInt512 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(hex_str)
            .map_err(|_| CoreError::invalid_format("UInt512 is not valid hex"))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for UInt512 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.to_array();
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt512 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt512({self})")
    }
}

impl Serializable for UInt512 {
    fn size(&self) -> usize {
        UINT512_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.to_array())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let bytes = reader.read_bytes(UINT512_SIZE)?;
        Ok(Self::from_bytes(&bytes).expect("read exactly 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    #[test]
    fn rejects_wrong_length() {
        assert!(UInt512::from_bytes(&[0u8; 63]).is_err());
        assert!(UInt512::from_bytes(&[0u8; 65]).is_err());
        assert!(UInt512::from_bytes(&[0u8; 64]).is_ok());
    }

    #[test]
    fn comparison_walks_most_significant_limb_first() {
        let mut low = [0u8; 64];
        low[0] = 0xFF;
        let mut high = [0u8; 64];
        high[63] = 0x01;
        assert!(UInt512::from(low) < UInt512::from(high));
    }

    #[test]
    fn parse_round_trips_display() {
        let mut bytes = [0u8; 64];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i * 3) as u8;
        }
        let value = UInt512::from(bytes);
        assert_eq!(UInt512::from_str(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn hash_is_stable_for_equal_values() {
        let mut bytes = [0u8; 64];
        bytes[17] = 0xAA;
        let a = UInt512::from(bytes);
        let b = UInt512::from(bytes);
        let digest = |v: &UInt512| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn byte_round_trip_preserves_limb_layout() {
        let mut bytes = [0u8; 64];
        bytes[8] = 0x01; // lowest byte of the second limb
        let value = UInt512::from(bytes);
        assert_eq!(value.to_array(), bytes);
    }
}
