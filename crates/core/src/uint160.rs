// Copyright (C) 2015-2025 The Neo Project.
//
// uint160.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! 160-bit unsigned integer, the script-hash and account type.

use crate::{CoreError, CoreResult};
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The width of a [`UInt160`] in bytes.
pub const UINT160_SIZE: usize = 20;

/// A 160-bit unsigned integer stored as little-endian bytes.
///
/// The textual form is hexadecimal in reversed byte order with a `0x`
/// prefix, so the most significant byte is printed first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UInt160([u8; UINT160_SIZE]);

impl UInt160 {
    /// The zero value.
    pub const ZERO: UInt160 = UInt160([0u8; UINT160_SIZE]);

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; UINT160_SIZE]
    }

    /// Constructs a value from exactly 20 little-endian bytes.
    pub fn from_bytes(value: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; UINT160_SIZE] = value.try_into().map_err(|_| {
            CoreError::invalid_format(format!("UInt160 requires 20 bytes, got {}", value.len()))
        })?;
        Ok(Self(bytes))
    }

    /// The script hash of a verification script.
    pub fn from_script(script: &[u8]) -> Self {
        Self(neo3_crypto::hash160(script))
    }

    /// The little-endian byte representation.
    pub fn to_array(&self) -> [u8; UINT160_SIZE] {
        self.0
    }

    /// A view of the little-endian bytes.
    pub fn get_span(&self) -> &[u8; UINT160_SIZE] {
        &self.0
    }
}

impl From<[u8; UINT160_SIZE]> for UInt160 {
    fn from(bytes: [u8; UINT160_SIZE]) -> Self {
        Self(bytes)
    }
}

impl PartialOrd for UInt160 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UInt160 {
    /// Unsigned comparison, most significant byte first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl FromStr for UInt160 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(hex_str)
            .map_err(|_| CoreError::invalid_format("UInt160 is not valid hex"))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt160({self})")
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        UINT160_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let bytes = reader.read_bytes(UINT160_SIZE)?;
        Ok(Self(bytes.try_into().expect("read exactly 20 bytes")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn rejects_wrong_length() {
        assert!(UInt160::from_bytes(&[0u8; 19]).is_err());
        assert!(UInt160::from_bytes(&[0u8; 21]).is_err());
        assert!(UInt160::from_bytes(&[0u8; 20]).is_ok());
    }

    #[test]
    fn display_reverses_byte_order() {
        let mut bytes = [0u8; 20];
        bytes[0] = 0x01;
        bytes[19] = 0xFF;
        let value = UInt160::from(bytes);
        let text = value.to_string();
        assert!(text.starts_with("0xff"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn parse_round_trips_display() {
        let mut bytes = [0u8; 20];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let value = UInt160::from(bytes);
        assert_eq!(UInt160::from_str(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn ordering_is_most_significant_first() {
        let mut low = [0u8; 20];
        low[0] = 0xFF; // large least-significant byte
        let mut high = [0u8; 20];
        high[19] = 0x01; // small most-significant byte
        assert!(UInt160::from(low) < UInt160::from(high));
    }

    #[test]
    fn serialization_round_trips() {
        let value = UInt160::from_script(b"\x51");
        let decoded = UInt160::from_array(&value.to_array()).unwrap();
        assert_eq!(decoded, value);
    }
}
