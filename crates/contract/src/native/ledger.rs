//! LedgerContract: the block and transaction index.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use neo3_config::ProtocolSettings;
use neo3_core::{Block, Header, Transaction, UInt160, UInt256, Witness};
use neo3_io::{BinaryWriter, MemoryReader, Serializable, SerializableExt};
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use std::sync::Arc;

pub const ID: i32 = -4;

const PREFIX_BLOCK: u8 = 5;
const PREFIX_BLOCK_HASH: u8 = 9;
const PREFIX_TRANSACTION: u8 = 11;
const PREFIX_CURRENT_BLOCK: u8 = 12;

/// The block and transaction index.
pub struct LedgerContract;

/// What the transaction index stores under a hash: a fully executed
/// transaction, or a conflict marker left by a `Conflicts` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRecord {
    Executed {
        block_index: u32,
        /// The resulting VM state byte (HALT/FAULT).
        vm_state: u8,
        transaction: Transaction,
    },
    Conflict {
        block_index: u32,
        /// Signers of the transactions that declared the conflict.
        signers: Vec<UInt160>,
    },
}

impl TransactionRecord {
    fn to_item(&self) -> StorageItem {
        let mut writer = BinaryWriter::new();
        match self {
            TransactionRecord::Executed {
                block_index,
                vm_state,
                transaction,
            } => {
                writer.write_u32(*block_index).expect("memory write");
                writer.write_u8(0).expect("memory write");
                writer.write_u8(*vm_state).expect("memory write");
                writer
                    .write_serializable(transaction)
                    .expect("memory write");
            }
            TransactionRecord::Conflict {
                block_index,
                signers,
            } => {
                writer.write_u32(*block_index).expect("memory write");
                writer.write_u8(1).expect("memory write");
                writer
                    .write_serializable_list(signers)
                    .expect("memory write");
            }
        }
        StorageItem::new(writer.into_bytes())
    }

    fn from_item(item: &StorageItem) -> Option<TransactionRecord> {
        let mut reader = MemoryReader::new(item.value());
        let block_index = reader.read_u32().ok()?;
        match reader.read_u8().ok()? {
            0 => {
                let vm_state = reader.read_u8().ok()?;
                let transaction = Transaction::deserialize(&mut reader).ok()?;
                Some(TransactionRecord::Executed {
                    block_index,
                    vm_state,
                    transaction,
                })
            }
            1 => {
                let signers = neo3_io::helper::deserialize_list(&mut reader, 16).ok()?;
                Some(TransactionRecord::Conflict {
                    block_index,
                    signers,
                })
            }
            _ => None,
        }
    }
}

fn current_block_key() -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_CURRENT_BLOCK)
}

fn block_hash_key(index: u32) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_BLOCK_HASH).append(&index.to_be_bytes())
}

fn block_key(hash: &UInt256) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_BLOCK).append(&hash.to_array())
}

fn transaction_key(hash: &UInt256) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_TRANSACTION).append(&hash.to_array())
}

/// Height of the ledger tip, if any block has been persisted.
pub fn current_index(snapshot: &Arc<DataCache>) -> Option<u32> {
    let item = snapshot.try_get(&current_block_key())?;
    let bytes = item.value();
    if bytes.len() < 36 {
        return None;
    }
    Some(u32::from_le_bytes(bytes[32..36].try_into().expect("4 bytes")))
}

/// Hash of the ledger tip.
pub fn current_hash(snapshot: &Arc<DataCache>) -> Option<UInt256> {
    let item = snapshot.try_get(&current_block_key())?;
    UInt256::from_bytes(&item.value()[..32]).ok()
}

/// The stored header of a block by hash.
pub fn get_header(snapshot: &Arc<DataCache>, hash: &UInt256) -> Option<Header> {
    let item = snapshot.try_get(&block_key(hash))?;
    let mut reader = MemoryReader::new(item.value());
    Header::deserialize(&mut reader).ok()
}

/// The hash of the block at `index`.
pub fn get_block_hash(snapshot: &Arc<DataCache>, index: u32) -> Option<UInt256> {
    let item = snapshot.try_get(&block_hash_key(index))?;
    UInt256::from_bytes(item.value()).ok()
}

/// The transaction record stored under `hash`.
pub fn get_transaction_record(
    snapshot: &Arc<DataCache>,
    hash: &UInt256,
) -> Option<TransactionRecord> {
    let item = snapshot.try_get(&transaction_key(hash))?;
    TransactionRecord::from_item(&item)
}

/// Whether an executed transaction exists under `hash`.
pub fn contains_transaction(snapshot: &Arc<DataCache>, hash: &UInt256) -> bool {
    matches!(
        get_transaction_record(snapshot, hash),
        Some(TransactionRecord::Executed { .. })
    )
}

/// Whether a conflict record exists for `hash` sharing a signer with
/// `signers`.
pub fn contains_conflict(
    snapshot: &Arc<DataCache>,
    hash: &UInt256,
    signers: &[UInt160],
) -> bool {
    match get_transaction_record(snapshot, hash) {
        Some(TransactionRecord::Conflict {
            signers: recorded, ..
        }) => recorded.iter().any(|signer| signers.contains(signer)),
        _ => false,
    }
}

/// Whether a block at `index` is still within the traceability window.
pub fn is_traceable_block(
    snapshot: &Arc<DataCache>,
    settings: &ProtocolSettings,
    index: u32,
) -> bool {
    match current_index(snapshot) {
        Some(current) => {
            index <= current && index + settings.max_traceable_blocks > current
        }
        None => false,
    }
}

/// Synthesizes the block a read-only execution pretends to run in: one past
/// the ledger tip, with an advanced timestamp and no transactions.
pub fn dummy_block(snapshot: &Arc<DataCache>, settings: &ProtocolSettings) -> Option<Block> {
    let tip_hash = current_hash(snapshot)?;
    let tip = get_header(snapshot, &tip_hash)?;
    Some(Block::new(
        Header::new(
            0,
            tip_hash,
            UInt256::ZERO,
            tip.timestamp + settings.milliseconds_per_block as u64,
            0,
            tip.index + 1,
            0,
            tip.next_consensus,
            Witness::empty(),
        ),
        Vec::new(),
    ))
}

/// Writes the block header, index mapping and transaction records while the
/// block persists. Called from `on_persist`.
pub fn store_block(snapshot: &Arc<DataCache>, block: &Block) {
    snapshot.put(
        &block_hash_key(block.index()),
        StorageItem::new(block.hash().to_array().to_vec()),
    );
    snapshot.put(
        &block_key(&block.hash()),
        StorageItem::new(block.header.to_array()),
    );
    let mut pointer = Vec::with_capacity(36);
    pointer.extend_from_slice(&block.hash().to_array());
    pointer.extend_from_slice(&block.index().to_le_bytes());
    snapshot.put(&current_block_key(), StorageItem::new(pointer));

    for tx in &block.transactions {
        let record = TransactionRecord::Executed {
            block_index: block.index(),
            vm_state: 0,
            transaction: tx.clone(),
        };
        snapshot.put(&transaction_key(&tx.hash()), record.to_item());

        // Conflict markers so the conflicting hashes can never confirm.
        let signers: Vec<UInt160> = tx.signers().iter().map(|s| s.account).collect();
        for attribute in tx.attributes() {
            if let neo3_core::TransactionAttribute::Conflicts { hash } = attribute {
                let merged = match get_transaction_record(snapshot, hash) {
                    Some(TransactionRecord::Conflict {
                        signers: mut existing,
                        block_index,
                    }) => {
                        for signer in &signers {
                            if !existing.contains(signer) {
                                existing.push(*signer);
                            }
                        }
                        TransactionRecord::Conflict {
                            block_index,
                            signers: existing,
                        }
                    }
                    Some(TransactionRecord::Executed { .. }) => continue,
                    None => TransactionRecord::Conflict {
                        block_index: block.index(),
                        signers: signers.clone(),
                    },
                };
                snapshot.put(&transaction_key(hash), merged.to_item());
            }
        }
    }
}

/// Records the execution outcome of a persisted transaction.
pub fn update_transaction_state(snapshot: &Arc<DataCache>, hash: &UInt256, vm_state: u8) {
    if let Some(TransactionRecord::Executed {
        block_index,
        transaction,
        ..
    }) = get_transaction_record(snapshot, hash)
    {
        let record = TransactionRecord::Executed {
            block_index,
            vm_state,
            transaction,
        };
        snapshot.put(&transaction_key(hash), record.to_item());
    }
}

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe("currentHash", &[], ContractParameterType::Hash256, 1 << 15),
    NativeMethod::safe("currentIndex", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::safe(
        "getBlock",
        &[("indexOrHash", ContractParameterType::ByteArray)],
        ContractParameterType::Array,
        1 << 16,
    ),
    NativeMethod::safe(
        "getTransaction",
        &[("hash", ContractParameterType::Hash256)],
        ContractParameterType::Array,
        1 << 15,
    ),
    NativeMethod::safe(
        "getTransactionHeight",
        &[("hash", ContractParameterType::Hash256)],
        ContractParameterType::Integer,
        1 << 15,
    ),
];

impl NativeContract for LedgerContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "LedgerContract"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn on_persist(&self, context: &mut EngineContext, _engine: &mut ExecutionEngine) -> VmResult<()> {
        let block = context
            .persisting_block
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperation("OnPersist without a block".into()))?
            .clone();
        store_block(&context.snapshot, &block);
        Ok(())
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        _engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        let snapshot = &context.snapshot;
        match method {
            "currentHash" => Ok(Some(
                current_hash(snapshot)
                    .map(|hash| StackItem::from_bytes(hash.to_array().to_vec()))
                    .unwrap_or(StackItem::Null),
            )),
            "currentIndex" => Ok(Some(
                current_index(snapshot)
                    .map(|index| StackItem::from_int(index as i64))
                    .unwrap_or(StackItem::Null),
            )),
            "getBlock" => {
                let bytes = args[0].to_bytes()?;
                let hash = match bytes.len() {
                    32 => UInt256::from_bytes(&bytes)
                        .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
                    _ => {
                        let index = args[0].to_index()? as u32;
                        match get_block_hash(snapshot, index) {
                            Some(hash) => hash,
                            None => return Ok(Some(StackItem::Null)),
                        }
                    }
                };
                let Some(header) = get_header(snapshot, &hash) else {
                    return Ok(Some(StackItem::Null));
                };
                if !is_traceable_block(snapshot, &context.settings, header.index) {
                    return Ok(Some(StackItem::Null));
                }
                Ok(Some(header_to_item(&header)))
            }
            "getTransaction" => {
                let hash = to_hash256(&args[0])?;
                match get_transaction_record(snapshot, &hash) {
                    Some(TransactionRecord::Executed { transaction, .. }) => {
                        Ok(Some(transaction_to_item(&transaction)))
                    }
                    _ => Ok(Some(StackItem::Null)),
                }
            }
            "getTransactionHeight" => {
                let hash = to_hash256(&args[0])?;
                match get_transaction_record(snapshot, &hash) {
                    Some(TransactionRecord::Executed { block_index, .. }) => {
                        Ok(Some(StackItem::from_int(block_index as i64)))
                    }
                    _ => Ok(Some(StackItem::from_int(-1))),
                }
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown LedgerContract method {other}"
            ))),
        }
    }
}

fn to_hash256(item: &StackItem) -> VmResult<UInt256> {
    let bytes = item.to_bytes()?;
    UInt256::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}

fn header_to_item(header: &Header) -> StackItem {
    StackItem::from_array(vec![
        StackItem::from_bytes(header.hash().to_array().to_vec()),
        StackItem::from_int(header.version as i64),
        StackItem::from_bytes(header.prev_hash.to_array().to_vec()),
        StackItem::from_bytes(header.merkle_root.to_array().to_vec()),
        StackItem::from_int(num_bigint::BigInt::from(header.timestamp)),
        StackItem::from_int(num_bigint::BigInt::from(header.nonce)),
        StackItem::from_int(header.index as i64),
        StackItem::from_int(header.primary_index as i64),
        StackItem::from_bytes(header.next_consensus.to_array().to_vec()),
    ])
}

fn transaction_to_item(tx: &Transaction) -> StackItem {
    StackItem::from_array(vec![
        StackItem::from_bytes(tx.hash().to_array().to_vec()),
        StackItem::from_int(tx.version() as i64),
        StackItem::from_int(tx.nonce() as i64),
        StackItem::from_bytes(tx.sender().to_array().to_vec()),
        StackItem::from_int(tx.system_fee()),
        StackItem::from_int(tx.network_fee()),
        StackItem::from_int(tx.valid_until_block() as i64),
        StackItem::from_bytes(tx.script().to_vec()),
    ])
}
