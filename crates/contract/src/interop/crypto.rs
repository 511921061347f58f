//! `System.Crypto.*` handlers.

use super::EngineContext;
use crate::application_engine::ContainerRef;
use neo3_core::Verifiable;
use neo3_crypto::{verify_multisig, ECPoint};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};

/// Price of one signature verification, scaled by the fee factor.
const CHECK_SIG_PRICE: i64 = 1 << 15;

fn sign_data(context: &EngineContext) -> VmResult<Vec<u8>> {
    let network = context.settings.network;
    match &context.container {
        ContainerRef::Transaction(tx) => Ok(tx.sign_data(network)),
        ContainerRef::Block(block) => Ok(block.header.sign_data(network)),
        ContainerRef::Extensible(payload) => Ok(payload.sign_data(network)),
        ContainerRef::None => Err(VmError::InvalidOperation(
            "no container to verify signatures against".into(),
        )),
    }
}

pub(super) fn check_sig(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let pubkey_bytes = engine.pop()?.to_bytes()?;
    let signature = engine.pop()?.to_bytes()?;
    let message = sign_data(context)?;
    let valid = ECPoint::from_bytes(&pubkey_bytes)
        .map(|pubkey| pubkey.verify_signature(&message, &signature))
        .unwrap_or(false);
    engine.push(StackItem::from_bool(valid))
}

pub(super) fn check_multisig(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let StackItem::Array(keys) = engine.pop()? else {
        return Err(VmError::InvalidType("public keys must be an array".into()));
    };
    let StackItem::Array(signatures) = engine.pop()? else {
        return Err(VmError::InvalidType("signatures must be an array".into()));
    };

    let mut pubkeys = Vec::new();
    for key in keys.borrow().iter() {
        let bytes = key.to_bytes()?;
        match ECPoint::from_bytes(&bytes) {
            Ok(pubkey) => pubkeys.push(pubkey),
            Err(_) => {
                engine.push(StackItem::from_bool(false))?;
                return Ok(());
            }
        }
    }
    let signatures: Vec<Vec<u8>> = signatures
        .borrow()
        .iter()
        .map(|signature| signature.to_bytes())
        .collect::<VmResult<_>>()?;

    // Charged per candidate key, like repeated CheckSig.
    context.add_fee(CHECK_SIG_PRICE * context.exec_fee_factor as i64 * pubkeys.len().max(1) as i64)?;

    let message = sign_data(context)?;
    let valid = verify_multisig(&message, &signatures, &pubkeys);
    engine.push(StackItem::from_bool(valid))
}
