//! StdLib: serialization and string conversion helpers for contracts.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use crate::BinarySerializer;
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::Num;

pub const ID: i32 = -2;

const MAX_INPUT_LENGTH: usize = 1024;

/// Standard library helpers.
pub struct StdLib;

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe(
        "serialize",
        &[("item", ContractParameterType::Any)],
        ContractParameterType::ByteArray,
        1 << 12,
    ),
    NativeMethod::safe(
        "deserialize",
        &[("data", ContractParameterType::ByteArray)],
        ContractParameterType::Any,
        1 << 14,
    ),
    NativeMethod::safe(
        "itoa",
        &[
            ("value", ContractParameterType::Integer),
            ("base", ContractParameterType::Integer),
        ],
        ContractParameterType::String,
        1 << 12,
    ),
    NativeMethod::safe(
        "atoi",
        &[
            ("value", ContractParameterType::String),
            ("base", ContractParameterType::Integer),
        ],
        ContractParameterType::Integer,
        1 << 6,
    ),
    NativeMethod::safe(
        "base64Encode",
        &[("data", ContractParameterType::ByteArray)],
        ContractParameterType::String,
        1 << 5,
    ),
    NativeMethod::safe(
        "base64Decode",
        &[("s", ContractParameterType::String)],
        ContractParameterType::ByteArray,
        1 << 5,
    ),
];

impl NativeContract for StdLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "StdLib"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        _context: &mut EngineContext,
        _engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        match method {
            "serialize" => {
                let bytes = BinarySerializer::serialize(&args[0])
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
                Ok(Some(StackItem::from_bytes(bytes)))
            }
            "deserialize" => {
                let bytes = args[0].to_bytes()?;
                let item = BinarySerializer::deserialize(&bytes)
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
                Ok(Some(item))
            }
            "itoa" => {
                let value = args[0].to_integer()?;
                let base = args[1].to_index()?;
                let text = match base {
                    10 => value.to_string(),
                    16 => value.to_str_radix(16),
                    other => {
                        return Err(VmError::InvalidOperation(format!(
                            "unsupported base {other}"
                        )))
                    }
                };
                Ok(Some(StackItem::from_bytes(text.into_bytes())))
            }
            "atoi" => {
                let bytes = args[0].to_bytes()?;
                if bytes.len() > MAX_INPUT_LENGTH {
                    return Err(VmError::LimitExceeded("atoi input too long".into()));
                }
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| VmError::InvalidType("atoi input is not UTF-8".into()))?;
                let base = args[1].to_index()?;
                let value = match base {
                    10 | 16 => BigInt::from_str_radix(text, base as u32)
                        .map_err(|_| VmError::InvalidOperation("unparsable number".into()))?,
                    other => {
                        return Err(VmError::InvalidOperation(format!(
                            "unsupported base {other}"
                        )))
                    }
                };
                Ok(Some(StackItem::Integer(value)))
            }
            "base64Encode" => {
                use base64::Engine;
                let bytes = args[0].to_bytes()?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(Some(StackItem::from_bytes(encoded.into_bytes())))
            }
            "base64Decode" => {
                use base64::Engine;
                let bytes = args[0].to_bytes()?;
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| VmError::InvalidType("base64 input is not UTF-8".into()))?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(text)
                    .map_err(|_| VmError::InvalidOperation("invalid base64".into()))?;
                Ok(Some(StackItem::from_bytes(decoded)))
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown StdLib method {other}"
            ))),
        }
    }
}
