//! `System.Storage.*` and `System.Iterator.*` handlers.

use super::EngineContext;
use crate::{BinarySerializer, StorageContext};
use neo3_persistence::{SeekDirection, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

const MAX_STORAGE_KEY_SIZE: usize = 64;
const MAX_STORAGE_VALUE_SIZE: usize = u16::MAX as usize;

/// Options controlling what `System.Storage.Find` yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions(pub u8);

impl FindOptions {
    pub const NONE: u8 = 0;
    pub const KEYS_ONLY: u8 = 1 << 0;
    pub const REMOVE_PREFIX: u8 = 1 << 1;
    pub const VALUES_ONLY: u8 = 1 << 2;
    pub const DESERIALIZE_VALUES: u8 = 1 << 3;
    pub const PICK_FIELD_0: u8 = 1 << 4;
    pub const PICK_FIELD_1: u8 = 1 << 5;
    pub const BACKWARDS: u8 = 1 << 7;

    fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

/// The iterator handed back by `System.Storage.Find`.
pub struct StorageIterator {
    entries: Vec<(StorageKey, StorageItem)>,
    options: FindOptions,
    prefix_length: usize,
    position: Option<usize>,
}

impl StorageIterator {
    fn advance(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.entries.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.entries.len());
            false
        }
    }

    fn current(&self) -> VmResult<StackItem> {
        let index = self
            .position
            .filter(|&p| p < self.entries.len())
            .ok_or_else(|| VmError::InvalidOperation("iterator has no current value".into()))?;
        let (key, value) = &self.entries[index];

        let mut key_bytes = key.suffix().to_vec();
        if self.options.contains(FindOptions::REMOVE_PREFIX) {
            key_bytes.drain(..self.prefix_length.min(key_bytes.len()));
        }
        let key_item = StackItem::from_bytes(key_bytes);

        let mut value_item = if self.options.contains(FindOptions::DESERIALIZE_VALUES)
            || self.options.contains(FindOptions::PICK_FIELD_0)
            || self.options.contains(FindOptions::PICK_FIELD_1)
        {
            BinarySerializer::deserialize(value.value())
                .map_err(|e| VmError::InvalidOperation(e.to_string()))?
        } else {
            StackItem::from_bytes(value.value().to_vec())
        };
        for (flag, field) in [
            (FindOptions::PICK_FIELD_0, 0usize),
            (FindOptions::PICK_FIELD_1, 1usize),
        ] {
            if self.options.contains(flag) {
                let StackItem::Array(items) = &value_item else {
                    return Err(VmError::InvalidType("picked value is not an array".into()));
                };
                let picked = items.borrow().get(field).cloned().ok_or_else(|| {
                    VmError::OutOfRange(format!("field {field} of deserialized value"))
                })?;
                value_item = picked;
            }
        }

        if self.options.contains(FindOptions::KEYS_ONLY) {
            return Ok(key_item);
        }
        if self.options.contains(FindOptions::VALUES_ONLY) {
            return Ok(value_item);
        }
        Ok(StackItem::from_struct(vec![key_item, value_item]))
    }
}

fn pop_storage_context(engine: &mut ExecutionEngine) -> VmResult<StorageContext> {
    match engine.pop()? {
        StackItem::InteropInterface(interface) => interface
            .downcast::<StorageContext>()
            .map(|context| *context)
            .map_err(|_| VmError::InvalidType("expected a storage context".into())),
        other => Err(VmError::InvalidType(format!(
            "expected a storage context, got {:?}",
            other.item_type()
        ))),
    }
}

fn current_contract_id(context: &EngineContext, engine: &ExecutionEngine) -> VmResult<i32> {
    let state = context.current_state(engine)?;
    if state.contract_id == 0 {
        return Err(VmError::InvalidOperation(
            "only deployed contracts have storage".into(),
        ));
    }
    Ok(state.contract_id)
}

pub(super) fn get_context(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let id = current_contract_id(context, engine)?;
    engine.push(StackItem::from_interface(StorageContext::new(id, false)))
}

pub(super) fn get_read_only_context(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let id = current_contract_id(context, engine)?;
    engine.push(StackItem::from_interface(StorageContext::new(id, true)))
}

pub(super) fn as_read_only(_context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let storage_context = pop_storage_context(engine)?;
    engine.push(StackItem::from_interface(storage_context.as_read_only()))
}

pub(super) fn get(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let storage_context = pop_storage_context(engine)?;
    let key = engine.pop()?.to_bytes()?;
    let storage_key = StorageKey::new(storage_context.id).append(&key);
    match context.snapshot.try_get(&storage_key) {
        Some(item) => engine.push(StackItem::from_bytes(item.into_value())),
        None => engine.push(StackItem::Null),
    }
}

pub(super) fn put(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let storage_context = pop_storage_context(engine)?;
    let key = engine.pop()?.to_bytes()?;
    let value = engine.pop()?.to_bytes()?;
    if storage_context.is_read_only {
        return Err(VmError::InvalidOperation("storage context is read-only".into()));
    }
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(VmError::LimitExceeded(format!(
            "storage key of {} bytes",
            key.len()
        )));
    }
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(VmError::LimitExceeded(format!(
            "storage value of {} bytes",
            value.len()
        )));
    }

    let storage_key = StorageKey::new(storage_context.id).append(&key);
    // New entries pay for key and value; rewrites pay only for growth, with
    // a one-byte minimum so writes are never free.
    let charged_bytes = match context.snapshot.try_get(&storage_key) {
        None => key.len() + value.len(),
        Some(existing) => value.len().saturating_sub(existing.len()).max(1),
    };
    context.add_fee(charged_bytes as i64 * context.storage_price as i64)?;
    context.snapshot.put(&storage_key, StorageItem::new(value));
    Ok(())
}

pub(super) fn delete(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let storage_context = pop_storage_context(engine)?;
    let key = engine.pop()?.to_bytes()?;
    if storage_context.is_read_only {
        return Err(VmError::InvalidOperation("storage context is read-only".into()));
    }
    let storage_key = StorageKey::new(storage_context.id).append(&key);
    context.snapshot.delete(&storage_key);
    Ok(())
}

pub(super) fn find(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let storage_context = pop_storage_context(engine)?;
    let prefix = engine.pop()?.to_bytes()?;
    let options = FindOptions(engine.pop()?.to_index()? as u8);
    if options.contains(FindOptions::KEYS_ONLY) && options.contains(FindOptions::VALUES_ONLY) {
        return Err(VmError::InvalidOperation(
            "KeysOnly and ValuesOnly are mutually exclusive".into(),
        ));
    }

    let direction = if options.contains(FindOptions::BACKWARDS) {
        SeekDirection::Backward
    } else {
        SeekDirection::Forward
    };
    let full_prefix = StorageKey::new(storage_context.id)
        .append(&prefix)
        .to_bytes();
    let entries = context
        .snapshot
        .find(&full_prefix, direction)
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;

    let iterator = StorageIterator {
        entries,
        options,
        prefix_length: prefix.len(),
        position: None,
    };
    engine.push(StackItem::InteropInterface(Rc::new(RefCell::new(iterator))))
}

fn pop_iterator(engine: &mut ExecutionEngine) -> VmResult<Rc<RefCell<StorageIterator>>> {
    match engine.pop()? {
        StackItem::InteropInterface(interface) => interface
            .downcast::<RefCell<StorageIterator>>()
            .map_err(|_| VmError::InvalidType("expected an iterator".into())),
        other => Err(VmError::InvalidType(format!(
            "expected an iterator, got {:?}",
            other.item_type()
        ))),
    }
}

pub(super) fn iterator_next(_context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let iterator = pop_iterator(engine)?;
    let has_next = iterator.borrow_mut().advance();
    engine.push(StackItem::from_bool(has_next))
}

pub(super) fn iterator_value(_context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let iterator = pop_iterator(engine)?;
    let value = iterator.borrow().current()?;
    engine.push(value)
}
