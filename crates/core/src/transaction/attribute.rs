//! Transaction attributes.

use crate::UInt256;
use neo3_io::{var_bytes_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum serialized size of an oracle response result.
pub const MAX_ORACLE_RESULT_SIZE: usize = 0xFFFF;

/// Outcome of an oracle request, carried inside [`TransactionAttribute::OracleResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OracleResponseCode {
    Success = 0x00,
    ProtocolNotSupported = 0x10,
    ConsensusUnreachable = 0x12,
    NotFound = 0x14,
    Timeout = 0x16,
    Forbidden = 0x18,
    ResponseTooLarge = 0x1A,
    InsufficientFunds = 0x1C,
    ContentTypeNotSupported = 0x1F,
    Error = 0xFF,
}

impl OracleResponseCode {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x10 => Some(Self::ProtocolNotSupported),
            0x12 => Some(Self::ConsensusUnreachable),
            0x14 => Some(Self::NotFound),
            0x16 => Some(Self::Timeout),
            0x18 => Some(Self::Forbidden),
            0x1A => Some(Self::ResponseTooLarge),
            0x1C => Some(Self::InsufficientFunds),
            0x1F => Some(Self::ContentTypeNotSupported),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// A typed annotation on a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAttribute {
    /// Lets a committee-signed transaction jump the fee queue.
    HighPriority,
    /// Marks the transaction as the response to an oracle request.
    OracleResponse {
        id: u64,
        code: OracleResponseCode,
        result: Vec<u8>,
    },
    /// Declares a conflict: this transaction and the referenced one cannot
    /// both be accepted.
    Conflicts { hash: UInt256 },
    /// Reserved for notary-assisted transactions; gated by hardfork.
    NotaryAssisted { n_keys: u8 },
}

impl TransactionAttribute {
    const TYPE_HIGH_PRIORITY: u8 = 0x01;
    const TYPE_ORACLE_RESPONSE: u8 = 0x11;
    const TYPE_CONFLICTS: u8 = 0x12;
    const TYPE_NOTARY_ASSISTED: u8 = 0x22;

    /// The wire type byte.
    pub fn type_byte(&self) -> u8 {
        match self {
            TransactionAttribute::HighPriority => Self::TYPE_HIGH_PRIORITY,
            TransactionAttribute::OracleResponse { .. } => Self::TYPE_ORACLE_RESPONSE,
            TransactionAttribute::Conflicts { .. } => Self::TYPE_CONFLICTS,
            TransactionAttribute::NotaryAssisted { .. } => Self::TYPE_NOTARY_ASSISTED,
        }
    }

    /// Whether several attributes of this type may appear in one transaction.
    pub fn allow_multiple(&self) -> bool {
        matches!(self, TransactionAttribute::Conflicts { .. })
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self {
            TransactionAttribute::HighPriority => 0,
            TransactionAttribute::OracleResponse { result, .. } => 8 + 1 + var_bytes_size(result),
            TransactionAttribute::Conflicts { .. } => 32,
            TransactionAttribute::NotaryAssisted { .. } => 1,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte())?;
        match self {
            TransactionAttribute::HighPriority => Ok(()),
            TransactionAttribute::OracleResponse { id, code, result } => {
                writer.write_u64(*id)?;
                writer.write_u8(*code as u8)?;
                writer.write_var_bytes(result)
            }
            TransactionAttribute::Conflicts { hash } => hash.serialize(writer),
            TransactionAttribute::NotaryAssisted { n_keys } => writer.write_u8(*n_keys),
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        match reader.read_u8()? {
            Self::TYPE_HIGH_PRIORITY => Ok(TransactionAttribute::HighPriority),
            Self::TYPE_ORACLE_RESPONSE => {
                let id = reader.read_u64()?;
                let code_byte = reader.read_u8()?;
                let code = OracleResponseCode::from_byte(code_byte).ok_or_else(|| {
                    IoError::invalid_format(format!("unknown oracle response code {code_byte:#04x}"))
                })?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(IoError::invalid_format(
                        "oracle error response must carry an empty result",
                    ));
                }
                Ok(TransactionAttribute::OracleResponse { id, code, result })
            }
            Self::TYPE_CONFLICTS => Ok(TransactionAttribute::Conflicts {
                hash: UInt256::deserialize(reader)?,
            }),
            Self::TYPE_NOTARY_ASSISTED => Ok(TransactionAttribute::NotaryAssisted {
                n_keys: reader.read_u8()?,
            }),
            other => Err(IoError::invalid_format(format!(
                "unknown transaction attribute type {other:#04x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn attributes_round_trip() {
        let attributes = [
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 7,
                code: OracleResponseCode::Success,
                result: vec![1, 2, 3],
            },
            TransactionAttribute::Conflicts {
                hash: UInt256::digest(b"other"),
            },
            TransactionAttribute::NotaryAssisted { n_keys: 4 },
        ];
        for attribute in attributes {
            let decoded = TransactionAttribute::from_array(&attribute.to_array()).unwrap();
            assert_eq!(decoded, attribute);
        }
    }

    #[test]
    fn only_conflicts_allows_multiple() {
        assert!(TransactionAttribute::Conflicts {
            hash: UInt256::ZERO
        }
        .allow_multiple());
        assert!(!TransactionAttribute::HighPriority.allow_multiple());
    }

    #[test]
    fn failed_oracle_response_with_result_is_rejected() {
        let attribute = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: vec![0xAA],
        };
        assert!(TransactionAttribute::from_array(&attribute.to_array()).is_err());
    }
}
