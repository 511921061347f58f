//! NEF: the executable file format for deployed contracts.

use crate::{ContractError, ContractResult};
use neo3_crypto::hash256;
use neo3_io::{
    helper, var_bytes_size, var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
    SerializableExt,
};

/// `NEF3` little-endian.
pub const NEF_MAGIC: u32 = 0x3346_454E;

/// Maximum script length carried in a NEF file.
pub const MAX_NEF_SCRIPT_SIZE: usize = 512 * 1024;

/// Maximum number of method tokens.
pub const MAX_METHOD_TOKENS: usize = 128;

/// Maximum length of the source URL string.
const MAX_SOURCE_SIZE: usize = 256;

/// A static call target referenced by `CALLT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodToken {
    pub hash: neo3_core::UInt160,
    pub method: String,
    pub parameters_count: u16,
    pub has_return_value: bool,
    pub call_flags: crate::CallFlags,
}

impl Serializable for MethodToken {
    fn size(&self) -> usize {
        20 + var_size(self.method.len() as u64) + self.method.len() + 2 + 1 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.hash.serialize(writer)?;
        writer.write_var_string(&self.method)?;
        writer.write_u16(self.parameters_count)?;
        writer.write_bool(self.has_return_value)?;
        writer.write_u8(self.call_flags.bits())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let hash = neo3_core::UInt160::deserialize(reader)?;
        let method = reader.read_var_string(32)?;
        if method.starts_with('_') {
            return Err(IoError::invalid_format(
                "method token targets a reserved method",
            ));
        }
        let parameters_count = reader.read_u16()?;
        let has_return_value = reader.read_bool()?;
        let call_flags = crate::CallFlags::from_bits(reader.read_u8()?)
            .ok_or_else(|| IoError::invalid_format("unknown call flags in method token"))?;
        Ok(Self {
            hash,
            method,
            parameters_count,
            has_return_value,
            call_flags,
        })
    }
}

/// The executable container: compiler metadata, method tokens, script and a
/// checksum over everything before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    /// Compiler name and version, at most 64 UTF-8 bytes.
    pub compiler: String,
    /// Source URL, possibly empty.
    pub source: String,
    pub tokens: Vec<MethodToken>,
    pub script: Vec<u8>,
    pub checksum: u32,
}

impl NefFile {
    /// Assembles a NEF with a freshly computed checksum.
    pub fn new(compiler: impl Into<String>, script: Vec<u8>) -> ContractResult<NefFile> {
        let mut nef = NefFile {
            compiler: compiler.into(),
            source: String::new(),
            tokens: Vec::new(),
            script,
            checksum: 0,
        };
        nef.validate_fields()?;
        nef.checksum = nef.compute_checksum();
        Ok(nef)
    }

    fn validate_fields(&self) -> ContractResult<()> {
        if self.compiler.len() > 64 {
            return Err(ContractError::invalid_format("compiler name over 64 bytes"));
        }
        if self.script.is_empty() || self.script.len() > MAX_NEF_SCRIPT_SIZE {
            return Err(ContractError::invalid_format(format!(
                "script of {} bytes outside 1..={MAX_NEF_SCRIPT_SIZE}",
                self.script.len()
            )));
        }
        if self.tokens.len() > MAX_METHOD_TOKENS {
            return Err(ContractError::invalid_format("too many method tokens"));
        }
        Ok(())
    }

    /// First four bytes of the double SHA-256 over everything before the
    /// checksum field, as a little-endian integer.
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_array();
        let digest = hash256(&bytes[..bytes.len() - 4]);
        u32::from_le_bytes(digest[..4].try_into().expect("4 bytes of a digest"))
    }

    /// Whether the stored checksum matches the content.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

impl Serializable for NefFile {
    fn size(&self) -> usize {
        4 + 64
            + var_size(self.source.len() as u64)
            + self.source.len()
            + 1
            + helper::list_size(&self.tokens)
            + 2
            + var_bytes_size(&self.script)
            + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(NEF_MAGIC)?;
        writer.write_fixed_string(&self.compiler, 64)?;
        writer.write_var_string(&self.source)?;
        writer.write_u8(0)?;
        writer.write_serializable_list(&self.tokens)?;
        writer.write_u16(0)?;
        writer.write_var_bytes(&self.script)?;
        writer.write_u32(self.checksum)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let magic = reader.read_u32()?;
        if magic != NEF_MAGIC {
            return Err(IoError::invalid_format(format!(
                "wrong NEF magic {magic:#010x}"
            )));
        }
        let compiler = reader.read_fixed_string(64)?;
        let source = reader.read_var_string(MAX_SOURCE_SIZE)?;
        if reader.read_u8()? != 0 {
            return Err(IoError::invalid_format("reserved byte must be zero"));
        }
        let tokens: Vec<MethodToken> = helper::deserialize_list(reader, MAX_METHOD_TOKENS)?;
        if reader.read_u16()? != 0 {
            return Err(IoError::invalid_format("reserved word must be zero"));
        }
        let script = reader.read_var_bytes(MAX_NEF_SCRIPT_SIZE)?;
        if script.is_empty() {
            return Err(IoError::invalid_format("empty NEF script"));
        }
        let checksum = reader.read_u32()?;
        let nef = NefFile {
            compiler,
            source,
            tokens,
            script,
            checksum,
        };
        if !nef.verify_checksum() {
            return Err(IoError::invalid_format("NEF checksum mismatch"));
        }
        Ok(nef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_valid_checksum() {
        let nef = NefFile::new("neo3-test-compiler 1.0", vec![0x51, 0x40]).unwrap();
        assert!(nef.verify_checksum());
        let decoded = NefFile::from_array(&nef.to_array()).unwrap();
        assert_eq!(decoded, nef);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let nef = NefFile::new("c", vec![0x51, 0x40]).unwrap();
        let mut bytes = nef.to_array();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(NefFile::from_array(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let nef = NefFile::new("c", vec![0x51, 0x40]).unwrap();
        let mut bytes = nef.to_array();
        bytes.push(0x00);
        assert!(NefFile::from_array(&bytes).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let nef = NefFile::new("c", vec![0x51]).unwrap();
        let mut bytes = nef.to_array();
        bytes[0] = 0x00;
        assert!(NefFile::from_array(&bytes).is_err());
    }

    #[test]
    fn oversized_compiler_is_rejected() {
        assert!(NefFile::new("x".repeat(65), vec![0x51]).is_err());
    }
}
