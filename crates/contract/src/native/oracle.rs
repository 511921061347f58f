//! OracleContract: request bookkeeping for off-chain data fetches.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use crate::{ContractError, ContractResult, Interoperable};
use neo3_core::{Transaction, TransactionAttribute, UInt160};
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use std::sync::Arc;

pub const ID: i32 = -9;

const PREFIX_PRICE: u8 = 5;
const PREFIX_REQUEST_ID: u8 = 9;
const PREFIX_REQUEST: u8 = 7;

const DEFAULT_REQUEST_PRICE: i64 = 5000_0000;
const MAX_URL_LENGTH: usize = 256;
const MAX_FILTER_LENGTH: usize = 128;
const MAX_CALLBACK_LENGTH: usize = 32;
const MAX_USER_DATA_LENGTH: usize = 512;
const MINIMUM_RESPONSE_GAS: i64 = 1000_0000;

/// A pending oracle request.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    /// Hash of the transaction that created the request.
    pub original_tx_hash: neo3_core::UInt256,
    /// GAS reserved for executing the response.
    pub gas_for_response: i64,
    pub url: String,
    pub filter: Option<String>,
    /// The contract to call back.
    pub callback_contract: UInt160,
    pub callback_method: String,
    /// Serialized user data handed back to the callback.
    pub user_data: Vec<u8>,
}

impl Interoperable for OracleRequest {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self> {
        let StackItem::Array(fields) = item else {
            return Err(ContractError::invalid_format("oracle request must be an array"));
        };
        let fields = fields.borrow();
        if fields.len() != 7 {
            return Err(ContractError::invalid_format("oracle request needs 7 fields"));
        }
        let bytes = |item: &StackItem| {
            item.to_bytes()
                .map_err(|e| ContractError::invalid_format(e.to_string()))
        };
        let text = |item: &StackItem| -> ContractResult<String> {
            String::from_utf8(bytes(item)?)
                .map_err(|_| ContractError::invalid_format("non-UTF-8 oracle string"))
        };
        Ok(Self {
            original_tx_hash: neo3_core::UInt256::from_bytes(&bytes(&fields[0])?)
                .map_err(|e| ContractError::invalid_format(e.to_string()))?,
            gas_for_response: i64::try_from(
                &fields[1]
                    .to_integer()
                    .map_err(|e| ContractError::invalid_format(e.to_string()))?,
            )
            .map_err(|_| ContractError::invalid_format("gas outside i64"))?,
            url: text(&fields[2])?,
            filter: if fields[3].is_null() {
                None
            } else {
                Some(text(&fields[3])?)
            },
            callback_contract: UInt160::from_bytes(&bytes(&fields[4])?)
                .map_err(|e| ContractError::invalid_format(e.to_string()))?,
            callback_method: text(&fields[5])?,
            user_data: bytes(&fields[6])?,
        })
    }

    fn to_stack_item(&self) -> StackItem {
        StackItem::from_array(vec![
            StackItem::from_bytes(self.original_tx_hash.to_array().to_vec()),
            StackItem::from_int(self.gas_for_response),
            StackItem::from_bytes(self.url.as_bytes().to_vec()),
            match &self.filter {
                Some(filter) => StackItem::from_bytes(filter.as_bytes().to_vec()),
                None => StackItem::Null,
            },
            StackItem::from_bytes(self.callback_contract.to_array().to_vec()),
            StackItem::from_bytes(self.callback_method.as_bytes().to_vec()),
            StackItem::from_bytes(self.user_data.clone()),
        ])
    }
}

/// Bookkeeping for oracle requests and responses.
pub struct OracleContract;

fn request_key(id: u64) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_REQUEST).append(&id.to_be_bytes())
}

/// The current price of an oracle request in datoshi.
pub fn price(snapshot: &Arc<DataCache>) -> i64 {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, PREFIX_PRICE))
        .map(|item| i64::try_from(&item.as_int()).unwrap_or(DEFAULT_REQUEST_PRICE))
        .unwrap_or(DEFAULT_REQUEST_PRICE)
}

/// The stored request with the given id, if any.
pub fn get_request(snapshot: &Arc<DataCache>, id: u64) -> Option<OracleRequest> {
    let item = snapshot.try_get(&request_key(id))?;
    OracleRequest::from_storage_item(&item).ok()
}

/// Stores a request under `id`. Used by the oracle service when replaying
/// persisted requests, and by tests seeding chain state.
pub fn store_request(
    snapshot: &Arc<DataCache>,
    id: u64,
    request: &OracleRequest,
) -> ContractResult<()> {
    let item = request.to_storage_item()?;
    snapshot.put(&request_key(id), item);
    Ok(())
}

/// Whether a response transaction matches a pending request. Used by the
/// transaction verifier.
pub fn verify_response(snapshot: &Arc<DataCache>, tx: &Transaction) -> bool {
    tx.attributes().iter().any(|attribute| {
        matches!(
            attribute,
            TransactionAttribute::OracleResponse { id, .. } if get_request(snapshot, *id).is_some()
        )
    })
}

fn next_request_id(snapshot: &Arc<DataCache>) -> u64 {
    let key = StorageKey::with_prefix(ID, PREFIX_REQUEST_ID);
    let current = snapshot
        .try_get(&key)
        .map(|item| u64::try_from(&item.as_int()).unwrap_or(0))
        .unwrap_or(0);
    snapshot.put(&key, StorageItem::from_int(&BigInt::from(current + 1)));
    current
}

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getPrice", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::unsafe_method(
        "setPrice",
        &[("price", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "request",
        &[
            ("url", ContractParameterType::String),
            ("filter", ContractParameterType::String),
            ("callback", ContractParameterType::String),
            ("userData", ContractParameterType::Any),
            ("gasForResponse", ContractParameterType::Integer),
        ],
        ContractParameterType::Void,
        0,
        0,
    ),
    NativeMethod::unsafe_method(
        "finish",
        &[],
        ContractParameterType::Void,
        0,
        0,
    ),
];

impl NativeContract for OracleContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "OracleContract"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn initialize(&self, context: &mut EngineContext) -> VmResult<()> {
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_PRICE),
            StorageItem::from_i64(DEFAULT_REQUEST_PRICE),
        );
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_REQUEST_ID),
            StorageItem::from_i64(0),
        );
        Ok(())
    }

    fn on_persist(&self, context: &mut EngineContext, _engine: &mut ExecutionEngine) -> VmResult<()> {
        // Settled requests leave storage once their response confirms.
        let block = context
            .persisting_block
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperation("OnPersist without a block".into()))?
            .clone();
        for tx in &block.transactions {
            for attribute in tx.attributes() {
                if let TransactionAttribute::OracleResponse { id, .. } = attribute {
                    context.snapshot.delete(&request_key(*id));
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        match method {
            "getPrice" => Ok(Some(StackItem::from_int(price(&context.snapshot)))),
            "setPrice" => {
                let value = i64::try_from(&args[0].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("price outside i64".into()))?;
                if value <= 0 {
                    return Err(VmError::OutOfRange("price must be positive".into()));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_PRICE),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "request" => {
                let url = utf8(&args[0], MAX_URL_LENGTH, "url")?;
                let filter = if args[1].is_null() {
                    None
                } else {
                    Some(utf8(&args[1], MAX_FILTER_LENGTH, "filter")?)
                };
                let callback = utf8(&args[2], MAX_CALLBACK_LENGTH, "callback")?;
                if callback.starts_with('_') {
                    return Err(VmError::InvalidOperation(
                        "callback cannot be a reserved method".into(),
                    ));
                }
                let user_data = crate::BinarySerializer::serialize(&args[3])
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
                if user_data.len() > MAX_USER_DATA_LENGTH {
                    return Err(VmError::LimitExceeded("oracle user data too large".into()));
                }
                let gas_for_response = i64::try_from(&args[4].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("gas outside i64".into()))?;
                if gas_for_response < MINIMUM_RESPONSE_GAS {
                    return Err(VmError::OutOfRange(format!(
                        "response gas below the minimum of {MINIMUM_RESPONSE_GAS}"
                    )));
                }

                context.add_fee(price(&context.snapshot))?;
                context.add_fee(gas_for_response)?;

                let tx_hash = context
                    .container
                    .transaction()
                    .map(|tx| tx.hash())
                    .ok_or_else(|| {
                        VmError::InvalidOperation("oracle request needs a transaction".into())
                    })?;
                let callback_contract = context.current_script_hash(engine)?;
                let id = next_request_id(&context.snapshot);
                let request = OracleRequest {
                    original_tx_hash: tx_hash,
                    gas_for_response,
                    url: url.clone(),
                    filter,
                    callback_contract,
                    callback_method: callback,
                    user_data,
                };
                let item = request
                    .to_storage_item()
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
                context.snapshot.put(&request_key(id), item);

                context.emit_native_notification(
                    super::native_hash(self.name()),
                    "OracleRequest",
                    StackItem::from_array(vec![
                        StackItem::from_int(BigInt::from(id)),
                        StackItem::from_bytes(callback_contract.to_array().to_vec()),
                        StackItem::from_bytes(url.into_bytes()),
                        match &request.filter {
                            Some(filter) => StackItem::from_bytes(filter.as_bytes().to_vec()),
                            None => StackItem::Null,
                        },
                    ]),
                );
                Ok(None)
            }
            "finish" => {
                // The response transaction carries the request id; route the
                // result to the requesting contract's callback.
                let tx = context
                    .container
                    .transaction()
                    .ok_or_else(|| {
                        VmError::InvalidOperation("oracle finish needs a transaction".into())
                    })?
                    .clone();
                let response = tx
                    .attributes()
                    .iter()
                    .find_map(|attribute| match attribute {
                        TransactionAttribute::OracleResponse { id, code, result } => {
                            Some((*id, *code, result.clone()))
                        }
                        _ => None,
                    })
                    .ok_or_else(|| {
                        VmError::InvalidOperation("transaction has no oracle response".into())
                    })?;
                let (id, code, result) = response;
                let request = get_request(&context.snapshot, id).ok_or_else(|| {
                    VmError::InvalidOperation(format!("no oracle request {id}"))
                })?;
                let user_data = crate::BinarySerializer::deserialize(&request.user_data)
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
                let callback_target = super::contract_management::get_contract(
                    &context.snapshot,
                    &request.callback_contract,
                )
                .ok_or_else(|| {
                    VmError::InvalidOperation("oracle callback contract is gone".into())
                })?;
                EngineContext::load_contract_method(
                    context,
                    engine,
                    &callback_target,
                    &request.callback_method,
                    vec![
                        StackItem::from_bytes(request.url.into_bytes()),
                        user_data,
                        StackItem::from_int(code as u8 as i64),
                        StackItem::from_bytes(result),
                    ],
                    crate::CallFlags::ALL,
                    Some(super::native_hash(self.name())),
                    false,
                )?;
                Ok(None)
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown OracleContract method {other}"
            ))),
        }
    }
}

fn utf8(item: &StackItem, max: usize, what: &str) -> VmResult<String> {
    let bytes = item.to_bytes()?;
    if bytes.len() > max {
        return Err(VmError::LimitExceeded(format!("oracle {what} too long")));
    }
    String::from_utf8(bytes).map_err(|_| VmError::InvalidType(format!("oracle {what} is not UTF-8")))
}
