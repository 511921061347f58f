// Copyright (C) 2015-2025 The Neo Project.
//
// uint256.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! 256-bit unsigned integer, the block- and transaction-hash type.

use crate::{CoreError, CoreResult};
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The width of a [`UInt256`] in bytes.
pub const UINT256_SIZE: usize = 32;

/// A 256-bit unsigned integer stored as little-endian bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UInt256([u8; UINT256_SIZE]);

impl UInt256 {
    /// The zero value.
    pub const ZERO: UInt256 = UInt256([0u8; UINT256_SIZE]);

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; UINT256_SIZE]
    }

    /// Constructs a value from exactly 32 little-endian bytes.
    pub fn from_bytes(value: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; UINT256_SIZE] = value.try_into().map_err(|_| {
            CoreError::invalid_format(format!("UInt256 requires 32 bytes, got {}", value.len()))
        })?;
        Ok(Self(bytes))
    }

    /// SHA-256 of arbitrary data, as a hash value.
    pub fn digest(data: &[u8]) -> Self {
        Self(neo3_crypto::sha256(data))
    }

    /// The little-endian byte representation.
    pub fn to_array(&self) -> [u8; UINT256_SIZE] {
        self.0
    }

    /// A view of the little-endian bytes.
    pub fn get_span(&self) -> &[u8; UINT256_SIZE] {
        &self.0
    }
}

impl From<[u8; UINT256_SIZE]> for UInt256 {
    fn from(bytes: [u8; UINT256_SIZE]) -> Self {
        Self(bytes)
    }
}

impl PartialOrd for UInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UInt256 {
    /// Unsigned comparison, most significant byte first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(hex_str)
            .map_err(|_| CoreError::invalid_format("UInt256 is not valid hex"))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({self})")
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        UINT256_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let bytes = reader.read_bytes(UINT256_SIZE)?;
        Ok(Self(bytes.try_into().expect("read exactly 32 bytes")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(UInt256::from_bytes(&[0u8; 31]).is_err());
        assert!(UInt256::from_bytes(&[0u8; 33]).is_err());
    }

    #[test]
    fn parse_round_trips_display() {
        let value = UInt256::digest(b"genesis");
        assert_eq!(UInt256::from_str(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn parse_accepts_bare_hex() {
        let value = UInt256::digest(b"x");
        let text = value.to_string();
        assert_eq!(UInt256::from_str(&text[2..]).unwrap(), value);
    }

    #[test]
    fn ordering_matches_numeric_interpretation() {
        let mut one = [0u8; 32];
        one[0] = 1;
        let mut big = [0u8; 32];
        big[31] = 1;
        assert!(UInt256::from(one) < UInt256::from(big));
        assert_eq!(UInt256::ZERO.cmp(&UInt256::ZERO), Ordering::Equal);
    }
}
