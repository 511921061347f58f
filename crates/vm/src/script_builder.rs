//! Incremental script construction.

use crate::{OpCode, Script, StackItem, VmResult};
use num_bigint::BigInt;
use num_traits::Signed;

/// Emits opcodes and push sequences into a byte buffer.
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Emits a bare opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.bytes.push(opcode as u8);
        self
    }

    /// Emits an opcode with raw operand bytes.
    pub fn emit_with(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.bytes.push(opcode as u8);
        self.bytes.extend_from_slice(operand);
        self
    }

    /// Emits raw bytes verbatim.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Emits the shortest push for an integer.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value: BigInt = value.into();
        if value >= BigInt::from(-1) && value <= BigInt::from(16) {
            let small: i64 = (&value).try_into().expect("range checked");
            self.bytes.push((OpCode::Push0 as u8 as i64 + small) as u8);
            return self;
        }
        let bytes = value.to_signed_bytes_le();
        let (opcode, width) = match bytes.len() {
            0..=1 => (OpCode::PushInt8, 1),
            2 => (OpCode::PushInt16, 2),
            3..=4 => (OpCode::PushInt32, 4),
            5..=8 => (OpCode::PushInt64, 8),
            9..=16 => (OpCode::PushInt128, 16),
            _ => (OpCode::PushInt256, 32),
        };
        let padding = if value.is_negative() { 0xFF } else { 0x00 };
        let mut operand = bytes;
        operand.resize(width, padding);
        self.emit_with(opcode, &operand)
    }

    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PushT } else { OpCode::PushF })
    }

    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PushNull)
    }

    /// Emits the shortest `PUSHDATA` form for a byte string.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.len() <= u8::MAX as usize {
            self.bytes.push(OpCode::PushData1 as u8);
            self.bytes.push(data.len() as u8);
        } else if data.len() <= u16::MAX as usize {
            self.bytes.push(OpCode::PushData2 as u8);
            self.bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            self.bytes.push(OpCode::PushData4 as u8);
            self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn emit_push_string(&mut self, value: &str) -> &mut Self {
        self.emit_push_bytes(value.as_bytes())
    }

    /// Pushes a stack item literal (no compound support).
    pub fn emit_push_item(&mut self, item: &StackItem) -> &mut Self {
        match item {
            StackItem::Null => self.emit_push_null(),
            StackItem::Boolean(value) => self.emit_push_bool(*value),
            StackItem::Integer(value) => self.emit_push_int(value.clone()),
            other => {
                let bytes = other.to_bytes().unwrap_or_default();
                self.emit_push_bytes(&bytes)
            }
        }
    }

    /// Emits a `SYSCALL` with the given descriptor hash.
    pub fn emit_syscall(&mut self, hash: u32) -> &mut Self {
        self.emit_with(OpCode::Syscall, &hash.to_le_bytes())
    }

    /// Emits a short `JMP`-family instruction with a relative offset.
    pub fn emit_jump(&mut self, opcode: OpCode, offset: i8) -> &mut Self {
        self.emit_with(opcode, &[offset as u8])
    }

    /// Emits a short `TRY` with relative catch/finally offsets (0 = absent).
    pub fn emit_try(&mut self, catch_offset: i8, finally_offset: i8) -> &mut Self {
        self.emit_with(OpCode::Try, &[catch_offset as u8, finally_offset as u8])
    }

    /// The accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Validates and returns the accumulated script.
    pub fn to_script(&self) -> VmResult<Script> {
        Script::new(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_use_single_byte_pushes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(-1);
        builder.emit_push_int(0);
        builder.emit_push_int(16);
        assert_eq!(builder.into_bytes(), vec![0x0F, 0x10, 0x20]);
    }

    #[test]
    fn larger_ints_use_sized_pushes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(255);
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], OpCode::PushInt16 as u8);
        assert_eq!(&bytes[1..], &[0xFF, 0x00]);
    }

    #[test]
    fn negative_padding_preserves_sign() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(-200i64);
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], OpCode::PushInt16 as u8);
        let value = i16::from_le_bytes([bytes[1], bytes[2]]);
        assert_eq!(value, -200);
    }

    #[test]
    fn push_data_sizes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&[0xAB; 3]);
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], OpCode::PushData1 as u8);
        assert_eq!(bytes[1], 3);

        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&vec![0u8; 300]);
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], OpCode::PushData2 as u8);
    }

    #[test]
    fn built_scripts_validate() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(2);
        builder.emit_push_int(3);
        builder.emit(OpCode::Mul);
        builder.emit(OpCode::Ret);
        assert!(builder.to_script().is_ok());
    }
}
