//! Type-inspection opcodes.

use crate::{ExecutionEngine, Instruction, OpCode, StackItem, StackItemType, VmError, VmResult};

impl ExecutionEngine {
    pub(crate) fn execute_type_op(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode() {
            OpCode::IsNull => {
                let item = self.pop()?;
                self.push(StackItem::from_bool(item.is_null()))
            }
            OpCode::IsType => {
                let target = decode_type(instruction.operand_u8())?;
                if target == StackItemType::Any {
                    return Err(VmError::BadScript("ISTYPE of Any".into()));
                }
                let item = self.pop()?;
                self.push(StackItem::from_bool(item.item_type() == target))
            }
            OpCode::Convert => {
                let target = decode_type(instruction.operand_u8())?;
                let item = self.pop()?;
                let converted = item.convert_to(target)?;
                self.push(converted)
            }
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a type opcode"
            ))),
        }
    }
}

fn decode_type(byte: u8) -> VmResult<StackItemType> {
    StackItemType::from_byte(byte)
        .ok_or_else(|| VmError::BadScript(format!("unknown item type {byte:#04x}")))
}
