//! `System.Contract.*` handlers.

use super::EngineContext;
use crate::{native, CallFlags, TriggerType};
use neo3_core::UInt160;
use neo3_crypto::ECPoint;
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};

pub(super) fn call(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let hash_bytes = engine.pop()?.to_bytes()?;
    let target = UInt160::from_bytes(&hash_bytes)
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    let method = String::from_utf8(engine.pop()?.to_bytes()?)
        .map_err(|_| VmError::InvalidType("method name is not UTF-8".into()))?;
    let flags_bits = engine.pop()?.to_index()? as u8;
    let flags = CallFlags::from_bits(flags_bits)
        .ok_or_else(|| VmError::InvalidOperation(format!("unknown call flags {flags_bits:#04x}")))?;
    let args = match engine.pop()? {
        StackItem::Array(items) => items.borrow().clone(),
        other => {
            return Err(VmError::InvalidType(format!(
                "call arguments must be an array, got {:?}",
                other.item_type()
            )))
        }
    };
    context.call_contract(engine, &target, &method, flags, args, true)
}

pub(super) fn call_native(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let version = engine.pop()?.to_index()?;
    if version != 0 {
        return Err(VmError::InvalidOperation(format!(
            "unsupported native contract version {version}"
        )));
    }
    native::invoke_native(context, engine)
}

pub(super) fn get_call_flags(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let flags = context.current_state(engine)?.call_flags.get();
    engine.push(StackItem::from_int(flags.bits() as i64))
}

pub(super) fn create_standard_account(
    _context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let pubkey_bytes = engine.pop()?.to_bytes()?;
    let pubkey: [u8; 33] = pubkey_bytes
        .try_into()
        .map_err(|_| VmError::InvalidType("public key must be 33 bytes".into()))?;
    ECPoint::from_bytes(&pubkey).map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    let hash = UInt160::from_script(&neo3_vm::signature_contract_script(&pubkey));
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

pub(super) fn create_multisig_account(
    _context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let m = engine.pop()?.to_index()?;
    let keys_item = engine.pop()?;
    let StackItem::Array(keys) = keys_item else {
        return Err(VmError::InvalidType("public keys must be an array".into()));
    };
    let mut pubkeys = Vec::new();
    for key in keys.borrow().iter() {
        let bytes = key.to_bytes()?;
        let pubkey: [u8; 33] = bytes
            .try_into()
            .map_err(|_| VmError::InvalidType("public key must be 33 bytes".into()))?;
        ECPoint::from_bytes(&pubkey).map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        pubkeys.push(pubkey);
    }
    let script = neo3_vm::multisig_contract_script(m, &pubkeys)
        .ok_or_else(|| VmError::InvalidOperation("invalid multisig parameters".into()))?;
    let hash = UInt160::from_script(&script);
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

pub(super) fn native_on_persist(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    if context.trigger != TriggerType::OnPersist {
        return Err(VmError::InvalidOperation(
            "NativeOnPersist outside the OnPersist trigger".into(),
        ));
    }
    for native in native::active_natives(context) {
        native.on_persist(context, engine)?;
    }
    Ok(())
}

pub(super) fn native_post_persist(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    if context.trigger != TriggerType::PostPersist {
        return Err(VmError::InvalidOperation(
            "NativePostPersist outside the PostPersist trigger".into(),
        ));
    }
    for native in native::active_natives(context) {
        native.post_persist(context, engine)?;
    }
    Ok(())
}
