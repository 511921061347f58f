//! `System.Runtime.*` handlers.

use super::EngineContext;
use crate::application_engine::ContainerRef;
use crate::CallFlags;
use neo3_core::UInt160;
use neo3_crypto::murmur128;
use neo3_vm::{ExecutionEngine, Script, StackItem, VmError, VmResult};
use num_bigint::{BigInt, Sign};

const MAX_LOG_LENGTH: usize = 1024;
const MAX_EVENT_NAME_LENGTH: usize = 32;

pub(super) fn platform(_context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_bytes(b"NEO".to_vec()))
}

pub(super) fn get_network(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(context.settings.network as i64))
}

pub(super) fn get_address_version(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    engine.push(StackItem::from_int(context.settings.address_version as i64))
}

pub(super) fn get_trigger(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(context.trigger as u8 as i64))
}

pub(super) fn get_time(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let timestamp = context
        .persisting_block
        .as_ref()
        .map(|block| block.timestamp())
        .ok_or_else(|| VmError::InvalidOperation("no block context for GetTime".into()))?;
    engine.push(StackItem::from_int(BigInt::from(timestamp)))
}

pub(super) fn get_script_container(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let item = match &context.container {
        ContainerRef::Transaction(tx) => StackItem::from_array(vec![
            StackItem::from_bytes(tx.hash().to_array().to_vec()),
            StackItem::from_int(tx.version() as i64),
            StackItem::from_int(tx.nonce() as i64),
            StackItem::from_bytes(tx.sender().to_array().to_vec()),
            StackItem::from_int(tx.system_fee()),
            StackItem::from_int(tx.network_fee()),
            StackItem::from_int(tx.valid_until_block() as i64),
            StackItem::from_bytes(tx.script().to_vec()),
        ]),
        ContainerRef::Block(block) => StackItem::from_array(vec![
            StackItem::from_bytes(block.hash().to_array().to_vec()),
            StackItem::from_int(block.header.version as i64),
            StackItem::from_bytes(block.header.prev_hash.to_array().to_vec()),
            StackItem::from_bytes(block.header.merkle_root.to_array().to_vec()),
            StackItem::from_int(BigInt::from(block.timestamp())),
            StackItem::from_int(BigInt::from(block.header.nonce)),
            StackItem::from_int(block.index() as i64),
            StackItem::from_int(block.header.primary_index as i64),
            StackItem::from_bytes(block.header.next_consensus.to_array().to_vec()),
            StackItem::from_int(block.transactions.len() as i64),
        ]),
        ContainerRef::Extensible(payload) => StackItem::from_array(vec![
            StackItem::from_bytes(payload.hash().to_array().to_vec()),
            StackItem::from_bytes(payload.category.as_bytes().to_vec()),
            StackItem::from_int(payload.valid_block_start as i64),
            StackItem::from_int(payload.valid_block_end as i64),
            StackItem::from_bytes(payload.sender.to_array().to_vec()),
        ]),
        ContainerRef::None => {
            return Err(VmError::InvalidOperation(
                "no script container attached".into(),
            ))
        }
    };
    engine.push(item)
}

pub(super) fn get_executing_script_hash(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let hash = context.current_script_hash(engine)?;
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

pub(super) fn get_calling_script_hash(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    match context.current_state(engine)?.calling_script_hash {
        Some(hash) => engine.push(StackItem::from_bytes(hash.to_array().to_vec())),
        None => engine.push(StackItem::Null),
    }
}

pub(super) fn get_entry_script_hash(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let hash = context.entry_script_hash(engine)?;
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

pub(super) fn load_script(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let script_bytes = engine.pop()?.to_bytes()?;
    let flags_bits = engine.pop()?.to_index()? as u8;
    let flags = CallFlags::from_bits(flags_bits)
        .ok_or_else(|| VmError::InvalidOperation("unknown call flags".into()))?;
    let args = match engine.pop()? {
        StackItem::Array(items) => items.borrow().clone(),
        other => {
            return Err(VmError::InvalidType(format!(
                "LoadScript arguments must be an array, got {:?}",
                other.item_type()
            )))
        }
    };

    let caller_state = context.current_state(engine)?;
    let effective = caller_state.call_flags.get() & flags;
    let script_hash = UInt160::from_script(&script_bytes);
    let script = Script::new(script_bytes)?;
    engine.load_script(script, 1, 0)?;
    let calling = caller_state.script_hash;
    crate::application_engine::attach_state(
        engine.current_context_mut().expect("just loaded"),
        std::rc::Rc::new(crate::ContextState {
            script_hash,
            calling_script_hash: Some(calling),
            call_flags: std::cell::Cell::new(effective),
            contract_id: 0,
            is_dynamic_call: true,
            notification_count: std::cell::Cell::new(0),
        }),
    );
    let current = engine.current_context_mut().expect("just loaded");
    let mut stack = current.evaluation_stack.borrow_mut();
    for arg in args.into_iter().rev() {
        stack.push(arg);
    }
    Ok(())
}

pub(super) fn check_witness(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let data = engine.pop()?.to_bytes()?;
    let account = match data.len() {
        20 => UInt160::from_bytes(&data)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
        33 => {
            let pubkey: [u8; 33] = data.try_into().expect("length checked");
            UInt160::from_script(&neo3_vm::signature_contract_script(&pubkey))
        }
        other => {
            return Err(VmError::InvalidType(format!(
                "witness subject of {other} bytes"
            )))
        }
    };
    let witnessed = context.check_witness_internal(engine, &account)?;
    engine.push(StackItem::from_bool(witnessed))
}

pub(super) fn get_random(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    context.random_state = murmur128(&context.random_state, 0x4E454F33);
    let value = BigInt::from_bytes_le(Sign::Plus, &context.random_state);
    engine.push(StackItem::Integer(value))
}

pub(super) fn log(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let bytes = engine.pop()?.to_bytes()?;
    if bytes.len() > MAX_LOG_LENGTH {
        return Err(VmError::LimitExceeded("log message too long".into()));
    }
    let message = String::from_utf8(bytes)
        .map_err(|_| VmError::InvalidType("log message is not UTF-8".into()))?;
    let script_hash = context.current_script_hash(engine)?;
    context.emit_log(script_hash, message);
    Ok(())
}

pub(super) fn notify(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let name_bytes = engine.pop()?.to_bytes()?;
    if name_bytes.len() > MAX_EVENT_NAME_LENGTH {
        return Err(VmError::LimitExceeded("event name too long".into()));
    }
    let event_name = String::from_utf8(name_bytes)
        .map_err(|_| VmError::InvalidType("event name is not UTF-8".into()))?;
    let state = engine.pop()?;
    if !matches!(state, StackItem::Array(_)) {
        return Err(VmError::InvalidType(
            "notification state must be an array".into(),
        ));
    }
    let script_hash = context.current_script_hash(engine)?;
    context.emit_notification(engine, script_hash, event_name, state)
}

pub(super) fn get_notifications(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let filter = match engine.pop()? {
        StackItem::Null => None,
        item => {
            let bytes = item.to_bytes()?;
            Some(
                UInt160::from_bytes(&bytes)
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
            )
        }
    };
    let entries: Vec<StackItem> = context
        .notifications
        .iter()
        .filter(|event| filter.map_or(true, |hash| event.script_hash == hash))
        .map(|event| {
            StackItem::from_array(vec![
                StackItem::from_bytes(event.script_hash.to_array().to_vec()),
                StackItem::from_bytes(event.event_name.as_bytes().to_vec()),
                event.state.clone(),
            ])
        })
        .collect();
    engine.push(StackItem::from_array(entries))
}

pub(super) fn gas_left(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let left = if context.gas_limit < 0 {
        -1
    } else {
        context.gas_limit - context.gas_consumed
    };
    engine.push(StackItem::from_int(left))
}

pub(super) fn burn_gas(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let amount = engine.pop_int()?;
    let amount = i64::try_from(&amount)
        .map_err(|_| VmError::OutOfRange("burn amount outside i64".into()))?;
    if amount <= 0 {
        return Err(VmError::OutOfRange("burn amount must be positive".into()));
    }
    context.add_fee(amount)
}
