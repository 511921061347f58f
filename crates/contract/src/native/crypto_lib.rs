//! CryptoLib: hashing and signature checks for contracts.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use neo3_crypto::{keccak256, murmur32, ripemd160, sha256, ECCurve, ECPoint};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};

pub const ID: i32 = -3;

/// Cryptographic helpers exposed to contracts.
pub struct CryptoLib;

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe(
        "sha256",
        &[("data", ContractParameterType::ByteArray)],
        ContractParameterType::ByteArray,
        1 << 15,
    ),
    NativeMethod::safe(
        "ripemd160",
        &[("data", ContractParameterType::ByteArray)],
        ContractParameterType::ByteArray,
        1 << 15,
    ),
    NativeMethod::safe(
        "keccak256",
        &[("data", ContractParameterType::ByteArray)],
        ContractParameterType::ByteArray,
        1 << 15,
    ),
    NativeMethod::safe(
        "murmur32",
        &[
            ("data", ContractParameterType::ByteArray),
            ("seed", ContractParameterType::Integer),
        ],
        ContractParameterType::ByteArray,
        1 << 13,
    ),
    NativeMethod::safe(
        "verifyWithECDsa",
        &[
            ("message", ContractParameterType::ByteArray),
            ("pubkey", ContractParameterType::PublicKey),
            ("signature", ContractParameterType::Signature),
            ("curve", ContractParameterType::Integer),
        ],
        ContractParameterType::Boolean,
        1 << 15,
    ),
];

impl NativeContract for CryptoLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "CryptoLib"
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
            "sha256" => {
                let data = args[0].to_bytes()?;
                Ok(Some(StackItem::from_bytes(sha256(&data).to_vec())))
            }
            "ripemd160" => {
                let data = args[0].to_bytes()?;
                Ok(Some(StackItem::from_bytes(ripemd160(&data).to_vec())))
            }
            "keccak256" => {
                let data = args[0].to_bytes()?;
                Ok(Some(StackItem::from_bytes(keccak256(&data).to_vec())))
            }
            "murmur32" => {
                let data = args[0].to_bytes()?;
                let seed = args[1].to_index()? as u32;
                Ok(Some(StackItem::from_bytes(
                    murmur32(&data, seed).to_le_bytes().to_vec(),
                )))
            }
            "verifyWithECDsa" => {
                let message = args[0].to_bytes()?;
                let pubkey_bytes = args[1].to_bytes()?;
                let signature = args[2].to_bytes()?;
                let curve = match args[3].to_index()? {
                    22 | 23 => ECCurve::Secp256r1,
                    24 | 25 => ECCurve::Secp256k1,
                    other => {
                        return Err(VmError::InvalidOperation(format!(
                            "unknown curve identifier {other}"
                        )))
                    }
                };
                let valid = ECPoint::decode(&pubkey_bytes, curve)
                    .map(|pubkey| pubkey.verify_signature(&message, &signature))
                    .unwrap_or(false);
                Ok(Some(StackItem::from_bool(valid)))
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown CryptoLib method {other}"
            ))),
        }
    }
}
