//! dBFT message types and their wire encoding.

use neo3_core::UInt256;
use neo3_io::{
    helper, var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
};

/// Category of extensible payloads carrying consensus traffic.
pub const CONSENSUS_CATEGORY: &str = "dBFT";

/// Upper bound on transaction hashes in a prepare request.
const MAX_TX_HASHES: usize = u16::MAX as usize;

/// Why a validator requested a view change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeViewReason {
    Timeout = 0x0,
    ChangeAgreement = 0x1,
    TxNotFound = 0x2,
    TxRejectedByPolicy = 0x3,
    TxInvalid = 0x4,
    BlockRejectedByPolicy = 0x5,
}

impl ChangeViewReason {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Self::Timeout),
            0x1 => Some(Self::ChangeAgreement),
            0x2 => Some(Self::TxNotFound),
            0x3 => Some(Self::TxRejectedByPolicy),
            0x4 => Some(Self::TxInvalid),
            0x5 => Some(Self::BlockRejectedByPolicy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeView {
    /// Milliseconds timestamp of the request, for timer synchronization.
    pub timestamp: u64,
    pub reason: ChangeViewReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub version: u32,
    pub prev_hash: UInt256,
    pub timestamp: u64,
    pub nonce: u64,
    pub transaction_hashes: Vec<UInt256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareResponse {
    /// Hash of the prepare-request payload being endorsed.
    pub preparation_hash: UInt256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Signature over the proposed block's signing data.
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub timestamp: u64,
}

/// Compact change-view evidence inside a recovery message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeViewCompact {
    pub validator_index: u8,
    pub original_view_number: u8,
    pub timestamp: u64,
}

/// Compact preparation evidence inside a recovery message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparationCompact {
    pub validator_index: u8,
}

/// Compact commit evidence inside a recovery message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCompact {
    pub view_number: u8,
    pub validator_index: u8,
    pub signature: [u8; 64],
}

/// Everything a validator has seen for the current view, bundled for peers
/// that fell behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryMessage {
    pub change_view_messages: Vec<ChangeViewCompact>,
    pub prepare_request: Option<PrepareRequest>,
    /// Present when no full prepare request is known but its hash is.
    pub preparation_hash: Option<UInt256>,
    pub preparation_messages: Vec<PreparationCompact>,
    pub commit_messages: Vec<CommitCompact>,
}

/// The per-kind payload of a consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusPayload {
    ChangeView(ChangeView),
    PrepareRequest(PrepareRequest),
    PrepareResponse(PrepareResponse),
    Commit(Commit),
    RecoveryRequest(RecoveryRequest),
    RecoveryMessage(Box<RecoveryMessage>),
}

impl ConsensusPayload {
    fn type_byte(&self) -> u8 {
        match self {
            ConsensusPayload::PrepareRequest(_) => 0x00,
            ConsensusPayload::PrepareResponse(_) => 0x01,
            ConsensusPayload::Commit(_) => 0x02,
            ConsensusPayload::ChangeView(_) => 0x03,
            ConsensusPayload::RecoveryRequest(_) => 0x04,
            ConsensusPayload::RecoveryMessage(_) => 0x05,
        }
    }
}

/// A routed consensus message: header fields shared by every kind plus the
/// payload. This is what travels inside an extensible payload's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub block_index: u32,
    pub validator_index: u8,
    pub view_number: u8,
    pub payload: ConsensusPayload,
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        1 + 4
            + 1
            + 1
            + match &self.payload {
                ConsensusPayload::ChangeView(_) => 8 + 1,
                ConsensusPayload::PrepareRequest(request) => {
                    4 + 32 + 8 + 8 + var_size(request.transaction_hashes.len() as u64)
                        + request.transaction_hashes.len() * 32
                }
                ConsensusPayload::PrepareResponse(_) => 32,
                ConsensusPayload::Commit(_) => 64,
                ConsensusPayload::RecoveryRequest(_) => 8,
                ConsensusPayload::RecoveryMessage(recovery) => recovery_size(recovery),
            }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.payload.type_byte())?;
        writer.write_u32(self.block_index)?;
        writer.write_u8(self.validator_index)?;
        writer.write_u8(self.view_number)?;
        match &self.payload {
            ConsensusPayload::ChangeView(change_view) => {
                writer.write_u64(change_view.timestamp)?;
                writer.write_u8(change_view.reason as u8)
            }
            ConsensusPayload::PrepareRequest(request) => {
                writer.write_u32(request.version)?;
                request.prev_hash.serialize(writer)?;
                writer.write_u64(request.timestamp)?;
                writer.write_u64(request.nonce)?;
                writer.write_serializable_list(&request.transaction_hashes)
            }
            ConsensusPayload::PrepareResponse(response) => {
                response.preparation_hash.serialize(writer)
            }
            ConsensusPayload::Commit(commit) => writer.write_bytes(&commit.signature),
            ConsensusPayload::RecoveryRequest(request) => writer.write_u64(request.timestamp),
            ConsensusPayload::RecoveryMessage(recovery) => serialize_recovery(recovery, writer),
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        let block_index = reader.read_u32()?;
        let validator_index = reader.read_u8()?;
        let view_number = reader.read_u8()?;
        let payload = match type_byte {
            0x00 => ConsensusPayload::PrepareRequest(PrepareRequest {
                version: reader.read_u32()?,
                prev_hash: UInt256::deserialize(reader)?,
                timestamp: reader.read_u64()?,
                nonce: reader.read_u64()?,
                transaction_hashes: helper::deserialize_list(reader, MAX_TX_HASHES)?,
            }),
            0x01 => ConsensusPayload::PrepareResponse(PrepareResponse {
                preparation_hash: UInt256::deserialize(reader)?,
            }),
            0x02 => {
                let bytes = reader.read_bytes(64)?;
                ConsensusPayload::Commit(Commit {
                    signature: bytes.try_into().expect("read exactly 64 bytes"),
                })
            }
            0x03 => {
                let timestamp = reader.read_u64()?;
                let reason_byte = reader.read_u8()?;
                let reason = ChangeViewReason::from_byte(reason_byte).ok_or_else(|| {
                    IoError::invalid_format(format!("unknown change view reason {reason_byte:#04x}"))
                })?;
                ConsensusPayload::ChangeView(ChangeView { timestamp, reason })
            }
            0x04 => ConsensusPayload::RecoveryRequest(RecoveryRequest {
                timestamp: reader.read_u64()?,
            }),
            0x05 => ConsensusPayload::RecoveryMessage(Box::new(deserialize_recovery(reader)?)),
            other => {
                return Err(IoError::invalid_format(format!(
                    "unknown consensus message type {other:#04x}"
                )))
            }
        };
        Ok(ConsensusMessage {
            block_index,
            validator_index,
            view_number,
            payload,
        })
    }
}

fn recovery_size(recovery: &RecoveryMessage) -> usize {
    var_size(recovery.change_view_messages.len() as u64)
        + recovery.change_view_messages.len() * 10
        + 1
        + recovery
            .prepare_request
            .as_ref()
            .map(|request| {
                4 + 32 + 8 + 8 + var_size(request.transaction_hashes.len() as u64)
                    + request.transaction_hashes.len() * 32
            })
            .unwrap_or(0)
        + recovery.preparation_hash.map(|_| 32).unwrap_or(0)
        + if recovery.prepare_request.is_some() { 0 } else { 1 }
        + var_size(recovery.preparation_messages.len() as u64)
        + recovery.preparation_messages.len()
        + var_size(recovery.commit_messages.len() as u64)
        + recovery.commit_messages.len() * 66
}

fn serialize_recovery(recovery: &RecoveryMessage, writer: &mut BinaryWriter) -> IoResult<()> {
    writer.write_var_int(recovery.change_view_messages.len() as u64)?;
    for compact in &recovery.change_view_messages {
        writer.write_u8(compact.validator_index)?;
        writer.write_u8(compact.original_view_number)?;
        writer.write_u64(compact.timestamp)?;
    }
    match &recovery.prepare_request {
        Some(request) => {
            writer.write_bool(true)?;
            writer.write_u32(request.version)?;
            request.prev_hash.serialize(writer)?;
            writer.write_u64(request.timestamp)?;
            writer.write_u64(request.nonce)?;
            writer.write_serializable_list(&request.transaction_hashes)?;
        }
        None => {
            writer.write_bool(false)?;
            match &recovery.preparation_hash {
                Some(hash) => {
                    writer.write_bool(true)?;
                    hash.serialize(writer)?;
                }
                None => writer.write_bool(false)?,
            }
        }
    }
    writer.write_var_int(recovery.preparation_messages.len() as u64)?;
    for compact in &recovery.preparation_messages {
        writer.write_u8(compact.validator_index)?;
    }
    writer.write_var_int(recovery.commit_messages.len() as u64)?;
    for compact in &recovery.commit_messages {
        writer.write_u8(compact.view_number)?;
        writer.write_u8(compact.validator_index)?;
        writer.write_bytes(&compact.signature)?;
    }
    Ok(())
}

fn deserialize_recovery(reader: &mut MemoryReader<'_>) -> IoResult<RecoveryMessage> {
    let change_view_count = reader.read_var_int(255)? as usize;
    let mut change_view_messages = Vec::with_capacity(change_view_count);
    for _ in 0..change_view_count {
        change_view_messages.push(ChangeViewCompact {
            validator_index: reader.read_u8()?,
            original_view_number: reader.read_u8()?,
            timestamp: reader.read_u64()?,
        });
    }
    let (prepare_request, preparation_hash) = if reader.read_bool()? {
        let request = PrepareRequest {
            version: reader.read_u32()?,
            prev_hash: UInt256::deserialize(reader)?,
            timestamp: reader.read_u64()?,
            nonce: reader.read_u64()?,
            transaction_hashes: helper::deserialize_list(reader, MAX_TX_HASHES)?,
        };
        (Some(request), None)
    } else if reader.read_bool()? {
        (None, Some(UInt256::deserialize(reader)?))
    } else {
        (None, None)
    };
    let preparation_count = reader.read_var_int(255)? as usize;
    let mut preparation_messages = Vec::with_capacity(preparation_count);
    for _ in 0..preparation_count {
        preparation_messages.push(PreparationCompact {
            validator_index: reader.read_u8()?,
        });
    }
    let commit_count = reader.read_var_int(255)? as usize;
    let mut commit_messages = Vec::with_capacity(commit_count);
    for _ in 0..commit_count {
        let view_number = reader.read_u8()?;
        let validator_index = reader.read_u8()?;
        let signature = reader.read_bytes(64)?;
        commit_messages.push(CommitCompact {
            view_number,
            validator_index,
            signature: signature.try_into().expect("read exactly 64 bytes"),
        });
    }
    Ok(RecoveryMessage {
        change_view_messages,
        prepare_request,
        preparation_hash,
        preparation_messages,
        commit_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    fn wrap(payload: ConsensusPayload) -> ConsensusMessage {
        ConsensusMessage {
            block_index: 42,
            validator_index: 3,
            view_number: 1,
            payload,
        }
    }

    #[test]
    fn every_message_kind_round_trips() {
        let messages = vec![
            wrap(ConsensusPayload::ChangeView(ChangeView {
                timestamp: 1234,
                reason: ChangeViewReason::Timeout,
            })),
            wrap(ConsensusPayload::PrepareRequest(PrepareRequest {
                version: 0,
                prev_hash: UInt256::digest(b"prev"),
                timestamp: 99,
                nonce: 7,
                transaction_hashes: vec![UInt256::digest(b"a"), UInt256::digest(b"b")],
            })),
            wrap(ConsensusPayload::PrepareResponse(PrepareResponse {
                preparation_hash: UInt256::digest(b"prep"),
            })),
            wrap(ConsensusPayload::Commit(Commit {
                signature: [0xAB; 64],
            })),
            wrap(ConsensusPayload::RecoveryRequest(RecoveryRequest {
                timestamp: 5,
            })),
        ];
        for message in messages {
            let decoded = ConsensusMessage::from_array(&message.to_array()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn recovery_message_round_trips_with_and_without_request() {
        let full = wrap(ConsensusPayload::RecoveryMessage(Box::new(RecoveryMessage {
            change_view_messages: vec![ChangeViewCompact {
                validator_index: 2,
                original_view_number: 0,
                timestamp: 10,
            }],
            prepare_request: Some(PrepareRequest {
                version: 0,
                prev_hash: UInt256::digest(b"p"),
                timestamp: 3,
                nonce: 4,
                transaction_hashes: vec![],
            }),
            preparation_hash: None,
            preparation_messages: vec![PreparationCompact { validator_index: 1 }],
            commit_messages: vec![CommitCompact {
                view_number: 1,
                validator_index: 0,
                signature: [7; 64],
            }],
        })));
        let decoded = ConsensusMessage::from_array(&full.to_array()).unwrap();
        assert_eq!(decoded, full);

        let hash_only = wrap(ConsensusPayload::RecoveryMessage(Box::new(RecoveryMessage {
            preparation_hash: Some(UInt256::digest(b"h")),
            ..RecoveryMessage::default()
        })));
        let decoded = ConsensusMessage::from_array(&hash_only.to_array()).unwrap();
        assert_eq!(decoded, hash_only);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let message = wrap(ConsensusPayload::RecoveryRequest(RecoveryRequest {
            timestamp: 5,
        }));
        let mut bytes = message.to_array();
        bytes[0] = 0x77;
        assert!(ConsensusMessage::from_array(&bytes).is_err());
    }
}
