//! Typed views over storage items.
//!
//! Contract state beyond raw integers is stored as a serialized stack item;
//! [`Interoperable`] types convert themselves to and from that form.

use crate::{ContractError, ContractResult};
use neo3_persistence::StorageItem;
use neo3_vm::{MapKey, StackItem, StackItemType};

/// Limits applied while (de)serializing stack items.
const MAX_SERIALIZATION_DEPTH: usize = 10;
const MAX_SERIALIZED_SIZE: usize = 1024 * 1024;

/// A type with a canonical stack-item representation.
pub trait Interoperable: Sized {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self>;
    fn to_stack_item(&self) -> StackItem;

    /// Decodes the type from a storage item.
    fn from_storage_item(item: &StorageItem) -> ContractResult<Self> {
        let stack_item = BinarySerializer::deserialize(item.value())?;
        Self::from_stack_item(&stack_item)
    }

    /// Encodes the type as a storage item.
    fn to_storage_item(&self) -> ContractResult<StorageItem> {
        let bytes = BinarySerializer::serialize(&self.to_stack_item())?;
        Ok(StorageItem::new(bytes))
    }
}

/// Canonical binary codec for stack items: a type byte followed by the
/// payload; compounds carry a count prefix.
pub struct BinarySerializer;

impl BinarySerializer {
    pub fn serialize(item: &StackItem) -> ContractResult<Vec<u8>> {
        let mut buffer = Vec::new();
        Self::write_item(item, &mut buffer, MAX_SERIALIZATION_DEPTH)?;
        if buffer.len() > MAX_SERIALIZED_SIZE {
            return Err(ContractError::invalid_format("serialized item too large"));
        }
        Ok(buffer)
    }

    pub fn deserialize(bytes: &[u8]) -> ContractResult<StackItem> {
        if bytes.len() > MAX_SERIALIZED_SIZE {
            return Err(ContractError::invalid_format("serialized item too large"));
        }
        let mut position = 0usize;
        let item = Self::read_item(bytes, &mut position, MAX_SERIALIZATION_DEPTH)?;
        if position != bytes.len() {
            return Err(ContractError::invalid_format(
                "trailing bytes after serialized item",
            ));
        }
        Ok(item)
    }

    fn write_item(item: &StackItem, buffer: &mut Vec<u8>, depth: usize) -> ContractResult<()> {
        if depth == 0 {
            return Err(ContractError::invalid_format("item nested too deeply"));
        }
        buffer.push(item.item_type() as u8);
        match item {
            StackItem::Null => Ok(()),
            StackItem::Boolean(value) => {
                buffer.push(u8::from(*value));
                Ok(())
            }
            StackItem::Integer(_) | StackItem::ByteString(_) | StackItem::Buffer(_) => {
                let bytes = item
                    .to_bytes()
                    .map_err(|e| ContractError::invalid_format(e.to_string()))?;
                write_var_bytes(buffer, &bytes);
                Ok(())
            }
            StackItem::Array(items) | StackItem::Struct(items) => {
                let items = items.borrow();
                write_var_int(buffer, items.len() as u64);
                for child in items.iter() {
                    Self::write_item(child, buffer, depth - 1)?;
                }
                Ok(())
            }
            StackItem::Map(entries) => {
                let entries = entries.borrow();
                write_var_int(buffer, entries.len() as u64);
                for (key, value) in entries.iter() {
                    Self::write_item(&key.to_item(), buffer, depth - 1)?;
                    Self::write_item(value, buffer, depth - 1)?;
                }
                Ok(())
            }
            StackItem::Pointer(_) | StackItem::InteropInterface(_) => Err(
                ContractError::invalid_format("pointers and interfaces are not serializable"),
            ),
        }
    }

    fn read_item(bytes: &[u8], position: &mut usize, depth: usize) -> ContractResult<StackItem> {
        if depth == 0 {
            return Err(ContractError::invalid_format("item nested too deeply"));
        }
        let type_byte = take(bytes, position, 1)?[0];
        let item_type = StackItemType::from_byte(type_byte)
            .ok_or_else(|| ContractError::invalid_format(format!("unknown type {type_byte:#04x}")))?;
        match item_type {
            StackItemType::Any => Ok(StackItem::Null),
            StackItemType::Boolean => {
                let byte = take(bytes, position, 1)?[0];
                Ok(StackItem::from_bool(byte != 0))
            }
            StackItemType::Integer => {
                let data = read_var_bytes(bytes, position, 32)?;
                StackItem::from_bytes(data)
                    .to_integer()
                    .map(StackItem::Integer)
                    .map_err(|e| ContractError::invalid_format(e.to_string()))
            }
            StackItemType::ByteString => {
                let data = read_var_bytes(bytes, position, MAX_SERIALIZED_SIZE)?;
                Ok(StackItem::from_bytes(data))
            }
            StackItemType::Buffer => {
                let data = read_var_bytes(bytes, position, MAX_SERIALIZED_SIZE)?;
                Ok(StackItem::from_buffer(data))
            }
            StackItemType::Array | StackItemType::Struct => {
                let count = read_var_int(bytes, position)? as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(Self::read_item(bytes, position, depth - 1)?);
                }
                Ok(if item_type == StackItemType::Array {
                    StackItem::from_array(items)
                } else {
                    StackItem::from_struct(items)
                })
            }
            StackItemType::Map => {
                let count = read_var_int(bytes, position)? as usize;
                let map = StackItem::new_map();
                if let StackItem::Map(entries) = &map {
                    let mut entries = entries.borrow_mut();
                    for _ in 0..count {
                        let key = Self::read_item(bytes, position, depth - 1)?;
                        let value = Self::read_item(bytes, position, depth - 1)?;
                        let key = MapKey::new(&key)
                            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
                        entries.insert(key, value);
                    }
                }
                Ok(map)
            }
            StackItemType::Pointer | StackItemType::InteropInterface => Err(
                ContractError::invalid_format("pointers and interfaces are not serializable"),
            ),
        }
    }
}

fn take<'a>(bytes: &'a [u8], position: &mut usize, count: usize) -> ContractResult<&'a [u8]> {
    if *position + count > bytes.len() {
        return Err(ContractError::invalid_format("truncated serialized item"));
    }
    let slice = &bytes[*position..*position + count];
    *position += count;
    Ok(slice)
}

fn write_var_int(buffer: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        buffer.push(value as u8);
    } else if value <= 0xFFFF {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(value as u16).to_le_bytes());
    } else {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(value as u32).to_le_bytes());
    }
}

fn write_var_bytes(buffer: &mut Vec<u8>, data: &[u8]) {
    write_var_int(buffer, data.len() as u64);
    buffer.extend_from_slice(data);
}

fn read_var_int(bytes: &[u8], position: &mut usize) -> ContractResult<u64> {
    let first = take(bytes, position, 1)?[0];
    Ok(match first {
        0xFD => u16::from_le_bytes(take(bytes, position, 2)?.try_into().expect("2 bytes")) as u64,
        0xFE => u32::from_le_bytes(take(bytes, position, 4)?.try_into().expect("4 bytes")) as u64,
        0xFF => u64::from_le_bytes(take(bytes, position, 8)?.try_into().expect("8 bytes")),
        byte => byte as u64,
    })
}

fn read_var_bytes(bytes: &[u8], position: &mut usize, max: usize) -> ContractResult<Vec<u8>> {
    let length = read_var_int(bytes, position)? as usize;
    if length > max {
        return Err(ContractError::invalid_format("length prefix too large"));
    }
    Ok(take(bytes, position, length)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn primitives_round_trip() {
        for item in [
            StackItem::Null,
            StackItem::from_bool(true),
            StackItem::from_int(BigInt::from(-123456789i64)),
            StackItem::from_bytes(b"payload".to_vec()),
        ] {
            let bytes = BinarySerializer::serialize(&item).unwrap();
            let decoded = BinarySerializer::deserialize(&bytes).unwrap();
            assert!(decoded.equals(&item).unwrap() || decoded.is_null() && item.is_null());
        }
    }

    #[test]
    fn nested_structures_round_trip() {
        let item = StackItem::from_array(vec![
            StackItem::from_int(1),
            StackItem::from_struct(vec![StackItem::from_bytes(b"x".to_vec())]),
        ]);
        let bytes = BinarySerializer::serialize(&item).unwrap();
        let decoded = BinarySerializer::deserialize(&bytes).unwrap();
        assert_eq!(decoded.compound_len(), Some(2));
    }

    #[test]
    fn interfaces_are_rejected() {
        let item = StackItem::from_interface(42u32);
        assert!(BinarySerializer::serialize(&item).is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = BinarySerializer::serialize(&StackItem::from_int(5)).unwrap();
        bytes.push(0x00);
        assert!(BinarySerializer::deserialize(&bytes).is_err());
    }
}
