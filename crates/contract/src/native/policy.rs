//! PolicyContract: committee-adjustable protocol knobs.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use neo3_core::UInt160;
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use std::sync::Arc;

pub const ID: i32 = -7;

const PREFIX_FEE_PER_BYTE: u8 = 10;
const PREFIX_BLOCKED_ACCOUNT: u8 = 15;
const PREFIX_EXEC_FEE_FACTOR: u8 = 18;
const PREFIX_STORAGE_PRICE: u8 = 19;
const PREFIX_ATTRIBUTE_FEE: u8 = 20;

pub const DEFAULT_FEE_PER_BYTE: i64 = 1_000;
pub const DEFAULT_EXEC_FEE_FACTOR: u32 = 30;
pub const DEFAULT_STORAGE_PRICE: u32 = 100_000;
const DEFAULT_ATTRIBUTE_FEE: i64 = 0;

const MAX_FEE_PER_BYTE: i64 = 1_0000_0000;
const MAX_EXEC_FEE_FACTOR: u32 = 100;
const MAX_STORAGE_PRICE: u32 = 10_0000_0000;
const MAX_ATTRIBUTE_FEE: i64 = 10_0000_0000;

/// Committee-adjustable fee and blocklist policy.
pub struct PolicyContract;

fn read_i64(snapshot: &Arc<DataCache>, prefix: u8, default: i64) -> i64 {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, prefix))
        .map(|item| i64::try_from(&item.as_int()).unwrap_or(default))
        .unwrap_or(default)
}

/// Network fee charged per transaction byte, in datoshi.
pub fn fee_per_byte(snapshot: &Arc<DataCache>) -> i64 {
    read_i64(snapshot, PREFIX_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
}

/// Multiplier applied to every opcode and syscall price.
pub fn exec_fee_factor(snapshot: &Arc<DataCache>) -> u32 {
    read_i64(snapshot, PREFIX_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR as i64) as u32
}

/// Datoshi charged per byte of contract storage.
pub fn storage_price(snapshot: &Arc<DataCache>) -> u32 {
    read_i64(snapshot, PREFIX_STORAGE_PRICE, DEFAULT_STORAGE_PRICE as i64) as u32
}

/// Extra network fee required by an attribute type.
pub fn attribute_fee(snapshot: &Arc<DataCache>, attribute_type: u8) -> i64 {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, PREFIX_ATTRIBUTE_FEE).append(&[attribute_type]))
        .map(|item| i64::try_from(&item.as_int()).unwrap_or(DEFAULT_ATTRIBUTE_FEE))
        .unwrap_or(DEFAULT_ATTRIBUTE_FEE)
}

fn blocked_key(account: &UInt160) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_BLOCKED_ACCOUNT).append(&account.to_array())
}

/// Whether an account is on the blocklist.
pub fn is_blocked(snapshot: &Arc<DataCache>, account: &UInt160) -> bool {
    snapshot.contains(&blocked_key(account))
}

/// Adds an account to the blocklist without a committee check; used when a
/// destroyed contract hash is retired.
pub(crate) fn block_account_internal(snapshot: &Arc<DataCache>, account: &UInt160) {
    snapshot.put(&blocked_key(account), StorageItem::new(Vec::new()));
}

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getFeePerByte", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::safe("getExecFeeFactor", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::safe("getStoragePrice", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::safe(
        "getAttributeFee",
        &[("attributeType", ContractParameterType::Integer)],
        ContractParameterType::Integer,
        1 << 15,
    ),
    NativeMethod::safe(
        "isBlocked",
        &[("account", ContractParameterType::Hash160)],
        ContractParameterType::Boolean,
        1 << 15,
    ),
    NativeMethod::unsafe_method(
        "setFeePerByte",
        &[("value", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "setExecFeeFactor",
        &[("value", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "setStoragePrice",
        &[("value", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "setAttributeFee",
        &[
            ("attributeType", ContractParameterType::Integer),
            ("value", ContractParameterType::Integer),
        ],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "blockAccount",
        &[("account", ContractParameterType::Hash160)],
        ContractParameterType::Boolean,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "unblockAccount",
        &[("account", ContractParameterType::Hash160)],
        ContractParameterType::Boolean,
        1 << 15,
        0,
    ),
];

impl NativeContract for PolicyContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "PolicyContract"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn initialize(&self, context: &mut EngineContext) -> VmResult<()> {
        let snapshot = &context.snapshot;
        snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_FEE_PER_BYTE),
            StorageItem::from_i64(DEFAULT_FEE_PER_BYTE),
        );
        snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_EXEC_FEE_FACTOR),
            StorageItem::from_i64(DEFAULT_EXEC_FEE_FACTOR as i64),
        );
        snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_STORAGE_PRICE),
            StorageItem::from_i64(DEFAULT_STORAGE_PRICE as i64),
        );
        Ok(())
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        let snapshot = context.snapshot.clone();
        match method {
            "getFeePerByte" => Ok(Some(StackItem::from_int(fee_per_byte(&snapshot)))),
            "getExecFeeFactor" => Ok(Some(StackItem::from_int(exec_fee_factor(&snapshot) as i64))),
            "getStoragePrice" => Ok(Some(StackItem::from_int(storage_price(&snapshot) as i64))),
            "getAttributeFee" => {
                let attribute_type = args[0].to_index()? as u8;
                Ok(Some(StackItem::from_int(attribute_fee(
                    &snapshot,
                    attribute_type,
                ))))
            }
            "isBlocked" => {
                let account = to_hash(&args[0])?;
                Ok(Some(StackItem::from_bool(is_blocked(&snapshot, &account))))
            }
            "setFeePerByte" => {
                let value = to_i64(&args[0])?;
                if !(0..=MAX_FEE_PER_BYTE).contains(&value) {
                    return Err(VmError::OutOfRange(format!("fee per byte {value}")));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_FEE_PER_BYTE),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "setExecFeeFactor" => {
                let value = to_i64(&args[0])?;
                if value <= 0 || value as u32 > MAX_EXEC_FEE_FACTOR {
                    return Err(VmError::OutOfRange(format!("exec fee factor {value}")));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_EXEC_FEE_FACTOR),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "setStoragePrice" => {
                let value = to_i64(&args[0])?;
                if value <= 0 || value as u32 > MAX_STORAGE_PRICE {
                    return Err(VmError::OutOfRange(format!("storage price {value}")));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_STORAGE_PRICE),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "setAttributeFee" => {
                let attribute_type = args[0].to_index()? as u8;
                let value = to_i64(&args[1])?;
                if !(0..=MAX_ATTRIBUTE_FEE).contains(&value) {
                    return Err(VmError::OutOfRange(format!("attribute fee {value}")));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_ATTRIBUTE_FEE).append(&[attribute_type]),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "blockAccount" => {
                super::neo_token::require_committee_witness(context, engine)?;
                let account = to_hash(&args[0])?;
                if super::native_by_hash(&account).is_some() {
                    return Err(VmError::InvalidOperation(
                        "native contracts cannot be blocked".into(),
                    ));
                }
                let fresh = !is_blocked(&context.snapshot, &account);
                if fresh {
                    block_account_internal(&context.snapshot, &account);
                }
                Ok(Some(StackItem::from_bool(fresh)))
            }
            "unblockAccount" => {
                super::neo_token::require_committee_witness(context, engine)?;
                let account = to_hash(&args[0])?;
                let was_blocked = is_blocked(&context.snapshot, &account);
                if was_blocked {
                    context.snapshot.delete(&blocked_key(&account));
                }
                Ok(Some(StackItem::from_bool(was_blocked)))
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown PolicyContract method {other}"
            ))),
        }
    }
}

fn to_hash(item: &StackItem) -> VmResult<UInt160> {
    let bytes = item.to_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}

fn to_i64(item: &StackItem) -> VmResult<i64> {
    i64::try_from(&item.to_integer()?)
        .map_err(|_| VmError::OutOfRange("value outside i64".into()))
}
