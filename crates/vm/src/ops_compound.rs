//! Compound-type opcodes: arrays, structs and maps.

use crate::{ExecutionEngine, Instruction, MapKey, OpCode, StackItem, StackItemType, VmError, VmResult};

impl ExecutionEngine {
    pub(crate) fn execute_compound_op(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode() {
            OpCode::PackMap => {
                let size = self.pop_index()?;
                let map = StackItem::new_map();
                if let StackItem::Map(entries) = &map {
                    let mut entries = entries.borrow_mut();
                    for _ in 0..size {
                        let value = self.pop()?;
                        let key = MapKey::new(&self.pop()?)?;
                        self.reference_counter().add_references(2);
                        entries.insert(key, value);
                    }
                }
                self.push(map)
            }
            OpCode::PackStruct | OpCode::Pack => {
                let size = self.pop_index()?;
                let mut items = Vec::with_capacity(size);
                for _ in 0..size {
                    items.push(self.pop()?);
                }
                self.reference_counter().add_references(items.len());
                let packed = if instruction.opcode() == OpCode::Pack {
                    StackItem::from_array(items)
                } else {
                    StackItem::from_struct(items)
                };
                self.push(packed)
            }
            OpCode::Unpack => match self.pop()? {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    let items = items.borrow();
                    for item in items.iter().rev() {
                        self.push(item.clone())?;
                    }
                    self.push(StackItem::from_int(items.len() as i64))
                }
                StackItem::Map(entries) => {
                    let entries = entries.borrow();
                    for (key, value) in entries.iter().rev() {
                        self.push(value.clone())?;
                        self.push(key.to_item())?;
                    }
                    self.push(StackItem::from_int(entries.len() as i64))
                }
                other => Err(VmError::InvalidType(format!(
                    "UNPACK of {:?}",
                    other.item_type()
                ))),
            },
            OpCode::NewArray0 => self.push(StackItem::from_array(Vec::new())),
            OpCode::NewStruct0 => self.push(StackItem::from_struct(Vec::new())),
            OpCode::NewArray | OpCode::NewArrayT | OpCode::NewStruct => {
                let count = self.pop_index()?;
                if count > self.limits().max_stack_size {
                    return Err(VmError::LimitExceeded(format!("array of {count} items")));
                }
                if instruction.opcode() == OpCode::NewArrayT {
                    // The element type only constrains decoding; the slots
                    // still start as null.
                    let type_byte = instruction.operand_u8();
                    StackItemType::from_byte(type_byte).ok_or_else(|| {
                        VmError::BadScript(format!("unknown item type {type_byte:#04x}"))
                    })?;
                }
                let items = vec![StackItem::Null; count];
                self.reference_counter().add_references(count);
                let packed = if instruction.opcode() == OpCode::NewStruct {
                    StackItem::from_struct(items)
                } else {
                    StackItem::from_array(items)
                };
                self.push(packed)
            }
            OpCode::NewMap => self.push(StackItem::new_map()),
            OpCode::Size => {
                let item = self.pop()?;
                let size = match &item {
                    StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
                    StackItem::Map(entries) => entries.borrow().len(),
                    StackItem::ByteString(_)
                    | StackItem::Buffer(_)
                    | StackItem::Integer(_)
                    | StackItem::Boolean(_) => item.to_bytes()?.len(),
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "SIZE of {:?}",
                            other.item_type()
                        )))
                    }
                };
                self.push(StackItem::from_int(size as i64))
            }
            OpCode::HasKey => {
                let key = self.pop()?;
                let collection = self.pop()?;
                let found = match &collection {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        key.to_index()? < items.borrow().len()
                    }
                    StackItem::Map(entries) => entries.borrow().contains_key(&MapKey::new(&key)?),
                    StackItem::ByteString(_) | StackItem::Buffer(_) => {
                        key.to_index()? < collection.to_bytes()?.len()
                    }
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "HASKEY on {:?}",
                            other.item_type()
                        )))
                    }
                };
                self.push(StackItem::from_bool(found))
            }
            OpCode::Keys => match self.pop()? {
                StackItem::Map(entries) => {
                    let keys: Vec<StackItem> =
                        entries.borrow().keys().map(MapKey::to_item).collect();
                    self.reference_counter().add_references(keys.len());
                    self.push(StackItem::from_array(keys))
                }
                other => Err(VmError::InvalidType(format!(
                    "KEYS on {:?}",
                    other.item_type()
                ))),
            },
            OpCode::Values => {
                let values: Vec<StackItem> = match self.pop()? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        items.borrow().iter().map(clone_for_assignment).collect()
                    }
                    StackItem::Map(entries) => {
                        entries.borrow().values().map(clone_for_assignment).collect()
                    }
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "VALUES on {:?}",
                            other.item_type()
                        )))
                    }
                };
                self.reference_counter().add_references(values.len());
                self.push(StackItem::from_array(values))
            }
            OpCode::PickItem => {
                let key = self.pop()?;
                let collection = self.pop()?;
                let item = match &collection {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let items = items.borrow();
                        let index = key.to_index()?;
                        items
                            .get(index)
                            .cloned()
                            .ok_or_else(|| VmError::OutOfRange(format!("index {index}")))?
                    }
                    StackItem::Map(entries) => entries
                        .borrow()
                        .get(&MapKey::new(&key)?)
                        .cloned()
                        .ok_or_else(|| VmError::OutOfRange("key not found in map".into()))?,
                    StackItem::ByteString(_) | StackItem::Buffer(_) => {
                        let bytes = collection.to_bytes()?;
                        let index = key.to_index()?;
                        let byte = *bytes
                            .get(index)
                            .ok_or_else(|| VmError::OutOfRange(format!("index {index}")))?;
                        StackItem::from_int(byte as i64)
                    }
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "PICKITEM on {:?}",
                            other.item_type()
                        )))
                    }
                };
                self.push(item)
            }
            OpCode::Append => {
                let item = self.pop()?;
                match self.pop()? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let item = clone_for_assignment(&item);
                        self.reference_counter().add_references(1);
                        items.borrow_mut().push(item);
                        Ok(())
                    }
                    other => Err(VmError::InvalidType(format!(
                        "APPEND to {:?}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::SetItem => {
                let value = self.pop()?;
                let key = self.pop()?;
                match self.pop()? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let index = key.to_index()?;
                        let mut items = items.borrow_mut();
                        let slot = items
                            .get_mut(index)
                            .ok_or_else(|| VmError::OutOfRange(format!("index {index}")))?;
                        *slot = clone_for_assignment(&value);
                        Ok(())
                    }
                    StackItem::Map(entries) => {
                        let key = MapKey::new(&key)?;
                        let mut entries = entries.borrow_mut();
                        if entries.insert(key, clone_for_assignment(&value)).is_none() {
                            self.reference_counter().add_references(2);
                        }
                        Ok(())
                    }
                    StackItem::Buffer(buffer) => {
                        let index = key.to_index()?;
                        let byte = value.to_integer()?;
                        let byte = u8::try_from(&byte).map_err(|_| {
                            VmError::OutOfRange(format!("{byte} is not a byte value"))
                        })?;
                        let mut buffer = buffer.borrow_mut();
                        let slot = buffer
                            .get_mut(index)
                            .ok_or_else(|| VmError::OutOfRange(format!("index {index}")))?;
                        *slot = byte;
                        Ok(())
                    }
                    other => Err(VmError::InvalidType(format!(
                        "SETITEM on {:?}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::ReverseItems => match self.pop()? {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    items.borrow_mut().reverse();
                    Ok(())
                }
                StackItem::Buffer(buffer) => {
                    buffer.borrow_mut().reverse();
                    Ok(())
                }
                other => Err(VmError::InvalidType(format!(
                    "REVERSEITEMS on {:?}",
                    other.item_type()
                ))),
            },
            OpCode::Remove => {
                let key = self.pop()?;
                match self.pop()? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let index = key.to_index()?;
                        let mut items = items.borrow_mut();
                        if index >= items.len() {
                            return Err(VmError::OutOfRange(format!("index {index}")));
                        }
                        items.remove(index);
                        self.reference_counter().remove_references(1);
                        Ok(())
                    }
                    StackItem::Map(entries) => {
                        let key = MapKey::new(&key)?;
                        if entries.borrow_mut().shift_remove(&key).is_some() {
                            self.reference_counter().remove_references(2);
                        }
                        Ok(())
                    }
                    other => Err(VmError::InvalidType(format!(
                        "REMOVE on {:?}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::ClearItems => match self.pop()? {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    let removed = items.borrow().len();
                    items.borrow_mut().clear();
                    self.reference_counter().remove_references(removed);
                    Ok(())
                }
                StackItem::Map(entries) => {
                    let removed = entries.borrow().len() * 2;
                    entries.borrow_mut().clear();
                    self.reference_counter().remove_references(removed);
                    Ok(())
                }
                other => Err(VmError::InvalidType(format!(
                    "CLEARITEMS on {:?}",
                    other.item_type()
                ))),
            },
            OpCode::PopItem => match self.pop()? {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    let item = items
                        .borrow_mut()
                        .pop()
                        .ok_or_else(|| VmError::OutOfRange("POPITEM from empty array".into()))?;
                    self.reference_counter().remove_references(1);
                    self.push(item)
                }
                other => Err(VmError::InvalidType(format!(
                    "POPITEM on {:?}",
                    other.item_type()
                ))),
            },
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a compound opcode"
            ))),
        }
    }
}

/// Structs are copied on assignment into containers; everything else shares.
fn clone_for_assignment(item: &StackItem) -> StackItem {
    match item {
        StackItem::Struct(_) => item.deep_copy(),
        other => other.clone(),
    }
}
