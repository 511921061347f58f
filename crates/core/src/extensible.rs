//! Extensible payloads: witness-carrying envelopes for node subsystems.
//!
//! Consensus messages travel the network inside these; the category string
//! routes the payload to the subsystem that understands it.

use crate::{UInt160, UInt256, Verifiable, Witness};
use neo3_io::{
    var_bytes_size, var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
};
use std::sync::OnceLock;

/// Maximum length of the category string.
const MAX_CATEGORY_SIZE: usize = 32;

/// Maximum size of the opaque payload data.
const MAX_DATA_SIZE: usize = 0xFFFF;

/// A signed, height-bounded message from a known sender.
#[derive(Debug, Clone)]
pub struct ExtensiblePayload {
    /// Routing key, e.g. `"dBFT"`.
    pub category: String,
    /// First block height at which the payload is valid.
    pub valid_block_start: u32,
    /// Height at which the payload expires (exclusive).
    pub valid_block_end: u32,
    /// Account vouching for the payload.
    pub sender: UInt160,
    /// Subsystem-defined content.
    pub data: Vec<u8>,
    /// Witness of `sender` over the unsigned encoding.
    pub witness: Witness,
    hash_cache: OnceLock<UInt256>,
}

impl PartialEq for ExtensiblePayload {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category
            && self.valid_block_start == other.valid_block_start
            && self.valid_block_end == other.valid_block_end
            && self.sender == other.sender
            && self.data == other.data
            && self.witness == other.witness
    }
}

impl Eq for ExtensiblePayload {}

impl ExtensiblePayload {
    pub fn new(
        category: impl Into<String>,
        valid_block_start: u32,
        valid_block_end: u32,
        sender: UInt160,
        data: Vec<u8>,
        witness: Witness,
    ) -> Self {
        Self {
            category: category.into(),
            valid_block_start,
            valid_block_end,
            sender,
            data,
            witness,
            hash_cache: OnceLock::new(),
        }
    }

    /// SHA-256 of the unsigned encoding, cached after first use.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash_cache
            .get_or_init(|| UInt256::digest(&self.unsigned_bytes()))
    }

    /// The unsigned encoding the witness commits to.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer)
            .expect("serialization into memory buffer");
        writer.into_bytes()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_string(&self.category)?;
        writer.write_u32(self.valid_block_start)?;
        writer.write_u32(self.valid_block_end)?;
        self.sender.serialize(writer)?;
        writer.write_var_bytes(&self.data)
    }
}

impl Verifiable for ExtensiblePayload {
    fn hash(&self) -> UInt256 {
        ExtensiblePayload::hash(self)
    }

    fn witnesses(&self) -> &[Witness] {
        std::slice::from_ref(&self.witness)
    }

    fn script_hashes_for_verifying(&self) -> Vec<UInt160> {
        vec![self.sender]
    }
}

impl Serializable for ExtensiblePayload {
    fn size(&self) -> usize {
        var_size(self.category.len() as u64)
            + self.category.len()
            + 4
            + 4
            + 20
            + var_bytes_size(&self.data)
            + 1
            + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        writer.write_var_int(1)?;
        self.witness.serialize(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let category = reader.read_var_string(MAX_CATEGORY_SIZE)?;
        let valid_block_start = reader.read_u32()?;
        let valid_block_end = reader.read_u32()?;
        if valid_block_start >= valid_block_end {
            return Err(IoError::invalid_format(
                "extensible payload validity window is empty",
            ));
        }
        let sender = UInt160::deserialize(reader)?;
        let data = reader.read_var_bytes(MAX_DATA_SIZE)?;
        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(IoError::invalid_format(format!(
                "extensible payload carries {witness_count} witnesses, expected 1"
            )));
        }
        let witness = Witness::deserialize(reader)?;
        Ok(Self::new(
            category,
            valid_block_start,
            valid_block_end,
            sender,
            data,
            witness,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trips() {
        let payload = ExtensiblePayload::new(
            "dBFT",
            10,
            20,
            UInt160::from_script(b"sender"),
            vec![1, 2, 3],
            Witness::empty(),
        );
        assert_eq!(
            ExtensiblePayload::from_array(&payload.to_array()).unwrap(),
            payload
        );
    }

    #[test]
    fn empty_validity_window_is_rejected() {
        let payload = ExtensiblePayload::new(
            "dBFT",
            20,
            20,
            UInt160::ZERO,
            Vec::new(),
            Witness::empty(),
        );
        assert!(ExtensiblePayload::from_array(&payload.to_array()).is_err());
    }
}
