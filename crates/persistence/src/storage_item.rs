//! Storage values.

use num_bigint::BigInt;
use num_traits::Zero;
use std::fmt;

/// An opaque byte value stored under a [`crate::StorageKey`].
///
/// Integer items use the minimal two's-complement little-endian encoding,
/// matching what contracts observe through the VM.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageItem {
    value: Vec<u8>,
}

impl StorageItem {
    /// Wraps raw bytes.
    pub fn new(value: Vec<u8>) -> Self {
        Self { value }
    }

    /// Encodes a big integer item.
    pub fn from_int(value: &BigInt) -> Self {
        Self {
            value: encode_int(value),
        }
    }

    /// Encodes a machine integer item.
    pub fn from_i64(value: i64) -> Self {
        Self::from_int(&BigInt::from(value))
    }

    /// The raw bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consumes the item, returning the bytes.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Replaces the bytes.
    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = value;
    }

    /// Decodes the item as a big integer.
    pub fn as_int(&self) -> BigInt {
        decode_int(&self.value)
    }

    /// Re-encodes the item from a big integer.
    pub fn set_int(&mut self, value: &BigInt) {
        self.value = encode_int(value);
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the item is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl From<Vec<u8>> for StorageItem {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for StorageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageItem(")?;
        for byte in &self.value {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Minimal two's-complement little-endian encoding; zero is empty.
fn encode_int(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

fn decode_int(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_le(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        for value in [0i64, 1, -1, 127, 128, -128, -129, i64::MAX, i64::MIN] {
            let item = StorageItem::from_i64(value);
            assert_eq!(item.as_int(), BigInt::from(value), "value {value}");
        }
    }

    #[test]
    fn zero_encodes_empty() {
        assert!(StorageItem::from_i64(0).is_empty());
        assert_eq!(StorageItem::new(Vec::new()).as_int(), BigInt::from(0));
    }

    #[test]
    fn set_int_replaces_bytes() {
        let mut item = StorageItem::from_i64(5);
        item.set_int(&BigInt::from(300));
        assert_eq!(item.as_int(), BigInt::from(300));
    }
}
