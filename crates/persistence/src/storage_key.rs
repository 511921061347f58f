//! Contract-scoped storage keys.

use std::cmp::Ordering;
use std::fmt;

/// A storage key: the owning contract id plus a byte suffix.
///
/// The serialized form used for ordering and backend storage is the
/// big-endian contract id followed by the suffix, so a contract's keys are
/// contiguous and iterate in suffix order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    id: i32,
    suffix: Vec<u8>,
}

impl StorageKey {
    /// Creates a key with an empty suffix.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            suffix: Vec::new(),
        }
    }

    /// Creates a key from a one-byte prefix.
    pub fn with_prefix(id: i32, prefix: u8) -> Self {
        Self {
            id,
            suffix: vec![prefix],
        }
    }

    /// Appends raw bytes to the suffix.
    pub fn append(mut self, bytes: &[u8]) -> Self {
        self.suffix.extend_from_slice(bytes);
        self
    }

    /// Appends a big-endian u32, keeping numeric and byte order aligned.
    pub fn append_u32_be(self, value: u32) -> Self {
        self.append(&value.to_be_bytes())
    }

    /// The owning contract id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The key bytes after the contract id.
    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    /// The serialized form: big-endian id followed by the suffix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.suffix.len());
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.suffix);
        bytes
    }

    /// Parses the serialized form. Inputs shorter than the id are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let id = i32::from_be_bytes(bytes[..4].try_into().expect("4-byte prefix"));
        Some(Self {
            id,
            suffix: bytes[4..].to_vec(),
        })
    }
}

impl PartialOrd for StorageKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StorageKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({}, ", self.id)?;
        for byte in &self.suffix {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_form_round_trips() {
        let key = StorageKey::with_prefix(-5, 0x14).append(b"account");
        let decoded = StorageKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.id(), -5);
    }

    #[test]
    fn ordering_follows_serialized_bytes() {
        let a = StorageKey::with_prefix(1, 0x01);
        let b = StorageKey::with_prefix(1, 0x02);
        let c = StorageKey::with_prefix(2, 0x00);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(StorageKey::from_bytes(&[0x00, 0x01]).is_none());
    }
}
