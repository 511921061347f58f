//! Witness: the executable proof attached to a signed object.

use crate::UInt160;
use neo3_config::MAX_WITNESS_SCRIPT_SIZE;
use neo3_io::{var_bytes_size, BinaryWriter, IoResult, MemoryReader, Serializable};

/// An invocation script (pushing signatures) paired with a verification
/// script (checking them). Running the pair must HALT with a truthy value on
/// top of the stack for the witness to be accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    pub invocation_script: Vec<u8>,
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Creates a witness from its two scripts.
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// The empty witness, `(0x00, 0x00)` on the wire.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The script hash of the verification script.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_script(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        var_bytes_size(&self.invocation_script) + var_bytes_size(&self.verification_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.invocation_script)?;
        writer.write_var_bytes(&self.verification_script)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let invocation_script = reader.read_var_bytes(MAX_WITNESS_SCRIPT_SIZE)?;
        let verification_script = reader.read_var_bytes(MAX_WITNESS_SCRIPT_SIZE)?;
        Ok(Self {
            invocation_script,
            verification_script,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn empty_witness_encodes_to_two_zero_bytes() {
        assert_eq!(Witness::empty().to_array(), vec![0x00, 0x00]);
    }

    #[test]
    fn round_trips() {
        let witness = Witness::new(vec![0x0C, 0x40], vec![0x41, 0x56, 0xE7, 0xB3, 0x27]);
        let decoded = Witness::from_array(&witness.to_array()).unwrap();
        assert_eq!(decoded, witness);
    }

    #[test]
    fn oversized_scripts_are_rejected_at_decode() {
        let witness = Witness::new(vec![0u8; 2048], Vec::new());
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&witness.invocation_script).unwrap();
        writer.write_var_bytes(&witness.verification_script).unwrap();
        assert!(Witness::from_array(&writer.into_bytes()).is_err());
    }
}
