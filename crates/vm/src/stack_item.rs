// Copyright (C) 2015-2025 The Neo Project.
//
// stack_item.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The values scripts compute with.

use crate::{VmError, VmResult};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Maximum byte width of an integer item.
pub const MAX_INTEGER_SIZE: usize = 32;

/// The wire/type tag of a stack item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    Any = 0x00,
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    InteropInterface = 0x60,
}

impl StackItemType {
    pub fn from_byte(byte: u8) -> Option<StackItemType> {
        match byte {
            0x00 => Some(Self::Any),
            0x10 => Some(Self::Pointer),
            0x20 => Some(Self::Boolean),
            0x21 => Some(Self::Integer),
            0x28 => Some(Self::ByteString),
            0x30 => Some(Self::Buffer),
            0x40 => Some(Self::Array),
            0x41 => Some(Self::Struct),
            0x48 => Some(Self::Map),
            0x60 => Some(Self::InteropInterface),
            _ => None,
        }
    }

    /// Whether values of this type may be used as map keys.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            StackItemType::Boolean | StackItemType::Integer | StackItemType::ByteString
        )
    }
}

/// A value on the evaluation stack.
///
/// Compound items (`Array`, `Struct`, `Map`) and `Buffer` share structure:
/// cloning the enum clones the handle, not the contents.
#[derive(Clone)]
pub enum StackItem {
    Null,
    Boolean(bool),
    Integer(BigInt),
    ByteString(Rc<Vec<u8>>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Array(Rc<RefCell<Vec<StackItem>>>),
    Struct(Rc<RefCell<Vec<StackItem>>>),
    Map(Rc<RefCell<IndexMap<MapKey, StackItem>>>),
    Pointer(usize),
    InteropInterface(Rc<dyn Any>),
}

impl StackItem {
    pub fn null() -> StackItem {
        StackItem::Null
    }

    pub fn from_bool(value: bool) -> StackItem {
        StackItem::Boolean(value)
    }

    pub fn from_int(value: impl Into<BigInt>) -> StackItem {
        StackItem::Integer(value.into())
    }

    pub fn from_bytes(value: impl Into<Vec<u8>>) -> StackItem {
        StackItem::ByteString(Rc::new(value.into()))
    }

    pub fn from_buffer(value: Vec<u8>) -> StackItem {
        StackItem::Buffer(Rc::new(RefCell::new(value)))
    }

    pub fn from_array(items: Vec<StackItem>) -> StackItem {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    pub fn from_struct(items: Vec<StackItem>) -> StackItem {
        StackItem::Struct(Rc::new(RefCell::new(items)))
    }

    pub fn new_map() -> StackItem {
        StackItem::Map(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn from_interface<T: Any>(value: T) -> StackItem {
        StackItem::InteropInterface(Rc::new(value))
    }

    /// The type tag of the item.
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Truthiness under the protocol's conversion rules.
    pub fn to_boolean(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(value) => *value,
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::ByteString(bytes) => bytes.iter().any(|&b| b != 0),
            StackItem::Buffer(_)
            | StackItem::Array(_)
            | StackItem::Struct(_)
            | StackItem::Map(_)
            | StackItem::Pointer(_)
            | StackItem::InteropInterface(_) => true,
        }
    }

    /// Numeric value; faults on non-numeric types and oversized byte forms.
    pub fn to_integer(&self) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(value) => Ok(BigInt::from(*value as u8)),
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) => bytes_to_integer(bytes),
            StackItem::Buffer(bytes) => bytes_to_integer(&bytes.borrow()),
            other => Err(VmError::InvalidType(format!(
                "{:?} cannot be interpreted as an integer",
                other.item_type()
            ))),
        }
    }

    /// A usize index; faults on negative or over-wide values.
    pub fn to_index(&self) -> VmResult<usize> {
        let value = self.to_integer()?;
        if value.is_negative() {
            return Err(VmError::OutOfRange(format!("negative index {value}")));
        }
        value
            .to_usize()
            .filter(|v| *v <= i32::MAX as usize)
            .ok_or_else(|| VmError::OutOfRange(format!("index {value} outside 31 bits")))
    }

    /// Byte form; faults on compound and interop types.
    pub fn to_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            StackItem::Boolean(value) => Ok(vec![u8::from(*value)]),
            StackItem::Integer(value) => Ok(integer_to_bytes(value)),
            StackItem::ByteString(bytes) => Ok(bytes.as_ref().clone()),
            StackItem::Buffer(bytes) => Ok(bytes.borrow().clone()),
            other => Err(VmError::InvalidType(format!(
                "{:?} has no byte representation",
                other.item_type()
            ))),
        }
    }

    /// Protocol equality: primitives by value, Buffer/Array/Map by handle,
    /// Struct by bounded deep comparison.
    pub fn equals(&self, other: &StackItem) -> VmResult<bool> {
        self.equals_bounded(other, &mut 2048)
    }

    fn equals_bounded(&self, other: &StackItem, budget: &mut usize) -> VmResult<bool> {
        if *budget == 0 {
            return Err(VmError::LimitExceeded("comparison too deep".into()));
        }
        *budget -= 1;
        match (self, other) {
            (StackItem::Null, StackItem::Null) => Ok(true),
            (StackItem::Null, _) | (_, StackItem::Null) => Ok(false),
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Array(a), StackItem::Array(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Map(a), StackItem::Map(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Pointer(a), StackItem::Pointer(b)) => Ok(a == b),
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => {
                Ok(Rc::ptr_eq(a, b))
            }
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.equals_bounded(y, budget)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            // Remaining combinations are primitives: compare byte forms.
            (a, b) if a.item_type().is_primitive() && b.item_type().is_primitive() => {
                Ok(a.to_bytes()? == b.to_bytes()?)
            }
            _ => Ok(false),
        }
    }

    /// Number of immediate children of a compound item.
    pub fn compound_len(&self) -> Option<usize> {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => Some(items.borrow().len()),
            StackItem::Map(entries) => Some(entries.borrow().len()),
            _ => None,
        }
    }

    /// Deep copy; compound structure is duplicated, primitives are shared.
    pub fn deep_copy(&self) -> StackItem {
        match self {
            StackItem::Buffer(bytes) => StackItem::from_buffer(bytes.borrow().clone()),
            StackItem::Array(items) => StackItem::from_array(
                items.borrow().iter().map(StackItem::deep_copy).collect(),
            ),
            StackItem::Struct(items) => StackItem::from_struct(
                items.borrow().iter().map(StackItem::deep_copy).collect(),
            ),
            StackItem::Map(entries) => {
                let copy: IndexMap<MapKey, StackItem> = entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.deep_copy()))
                    .collect();
                StackItem::Map(Rc::new(RefCell::new(copy)))
            }
            other => other.clone(),
        }
    }

    /// Converts the item to another type under the protocol rules.
    pub fn convert_to(&self, target: StackItemType) -> VmResult<StackItem> {
        if self.item_type() == target {
            return Ok(self.clone());
        }
        match target {
            StackItemType::Boolean => Ok(StackItem::from_bool(self.to_boolean())),
            StackItemType::Integer => Ok(StackItem::Integer(self.to_integer()?)),
            StackItemType::ByteString => Ok(StackItem::from_bytes(self.to_bytes()?)),
            StackItemType::Buffer => Ok(StackItem::from_buffer(self.to_bytes()?)),
            StackItemType::Array => match self {
                StackItem::Struct(items) => Ok(StackItem::Array(Rc::new(RefCell::new(
                    items.borrow().clone(),
                )))),
                _ => Err(VmError::InvalidType(format!(
                    "cannot convert {:?} to Array",
                    self.item_type()
                ))),
            },
            StackItemType::Struct => match self {
                StackItem::Array(items) => Ok(StackItem::Struct(Rc::new(RefCell::new(
                    items.borrow().clone(),
                )))),
                _ => Err(VmError::InvalidType(format!(
                    "cannot convert {:?} to Struct",
                    self.item_type()
                ))),
            },
            StackItemType::Any if self.is_null() => Ok(StackItem::Null),
            _ => Err(VmError::InvalidType(format!(
                "cannot convert {:?} to {target:?}",
                self.item_type()
            ))),
        }
    }
}

impl std::fmt::Debug for StackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackItem::Null => write!(f, "Null"),
            StackItem::Boolean(value) => write!(f, "Boolean({value})"),
            StackItem::Integer(value) => write!(f, "Integer({value})"),
            StackItem::ByteString(bytes) => {
                write!(f, "ByteString(0x")?;
                for byte in bytes.iter() {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ")")
            }
            StackItem::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.borrow().len()),
            StackItem::Array(items) => write!(f, "Array({} items)", items.borrow().len()),
            StackItem::Struct(items) => write!(f, "Struct({} items)", items.borrow().len()),
            StackItem::Map(entries) => write!(f, "Map({} entries)", entries.borrow().len()),
            StackItem::Pointer(position) => write!(f, "Pointer({position})"),
            StackItem::InteropInterface(_) => write!(f, "InteropInterface"),
        }
    }
}

/// A validated, hashable map key: a primitive stack item compared by its
/// canonical byte form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapKey {
    kind: StackItemType,
    bytes: Vec<u8>,
}

impl MapKey {
    /// Wraps a primitive item; compound and interop keys are invalid.
    pub fn new(item: &StackItem) -> VmResult<MapKey> {
        let kind = item.item_type();
        if !kind.is_primitive() {
            return Err(VmError::InvalidType(format!(
                "{kind:?} cannot be a map key"
            )));
        }
        Ok(MapKey {
            kind,
            bytes: item.to_bytes()?,
        })
    }

    /// Reconstructs the key as a stack item.
    pub fn to_item(&self) -> StackItem {
        match self.kind {
            StackItemType::Boolean => StackItem::from_bool(self.bytes == [1]),
            StackItemType::Integer => StackItem::Integer(if self.bytes.is_empty() {
                BigInt::zero()
            } else {
                BigInt::from_signed_bytes_le(&self.bytes)
            }),
            _ => StackItem::from_bytes(self.bytes.clone()),
        }
    }
}

/// Minimal two's-complement little-endian form; zero is empty.
pub fn integer_to_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

fn bytes_to_integer(bytes: &[u8]) -> VmResult<BigInt> {
    if bytes.len() > MAX_INTEGER_SIZE {
        return Err(VmError::InvalidType(format!(
            "{} bytes exceed the integer width",
            bytes.len()
        )));
    }
    if bytes.is_empty() {
        return Ok(BigInt::zero());
    }
    Ok(BigInt::from_signed_bytes_le(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!StackItem::Null.to_boolean());
        assert!(!StackItem::from_int(0).to_boolean());
        assert!(StackItem::from_int(-1).to_boolean());
        assert!(!StackItem::from_bytes(vec![0, 0]).to_boolean());
        assert!(StackItem::from_bytes(vec![0, 1]).to_boolean());
        assert!(StackItem::from_array(vec![]).to_boolean());
    }

    #[test]
    fn integer_byte_round_trip() {
        for value in [0i64, 1, -1, 255, 256, -256, i64::MAX] {
            let item = StackItem::from_int(value);
            let bytes = item.to_bytes().unwrap();
            let back = StackItem::from_bytes(bytes).to_integer().unwrap();
            assert_eq!(back, BigInt::from(value));
        }
    }

    #[test]
    fn oversized_byte_string_is_not_an_integer() {
        let item = StackItem::from_bytes(vec![1u8; 33]);
        assert!(item.to_integer().is_err());
    }

    #[test]
    fn arrays_compare_by_reference_structs_by_value() {
        let a = StackItem::from_array(vec![StackItem::from_int(1)]);
        let b = StackItem::from_array(vec![StackItem::from_int(1)]);
        assert!(!a.equals(&b).unwrap());
        assert!(a.equals(&a.clone()).unwrap());

        let s1 = StackItem::from_struct(vec![StackItem::from_int(1)]);
        let s2 = StackItem::from_struct(vec![StackItem::from_int(1)]);
        assert!(s1.equals(&s2).unwrap());
    }

    #[test]
    fn clone_shares_compound_structure() {
        let array = StackItem::from_array(vec![]);
        let alias = array.clone();
        if let StackItem::Array(items) = &array {
            items.borrow_mut().push(StackItem::from_int(9));
        }
        assert_eq!(alias.compound_len(), Some(1));
    }

    #[test]
    fn deep_copy_detaches_structure() {
        let array = StackItem::from_array(vec![StackItem::from_int(1)]);
        let copy = array.deep_copy();
        if let StackItem::Array(items) = &array {
            items.borrow_mut().push(StackItem::from_int(2));
        }
        assert_eq!(copy.compound_len(), Some(1));
    }

    #[test]
    fn struct_to_array_conversion() {
        let value = StackItem::from_struct(vec![StackItem::from_int(5)]);
        let converted = value.convert_to(StackItemType::Array).unwrap();
        assert_eq!(converted.item_type(), StackItemType::Array);
        assert!(StackItem::from_int(5).convert_to(StackItemType::Map).is_err());
    }

    #[test]
    fn map_keys_compare_by_value() {
        let k1 = MapKey::new(&StackItem::from_int(300)).unwrap();
        let k2 = MapKey::new(&StackItem::from_int(300)).unwrap();
        assert_eq!(k1, k2);
        assert!(MapKey::new(&StackItem::from_array(vec![])).is_err());
    }
}
