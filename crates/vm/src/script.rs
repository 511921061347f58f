//! Validated scripts.

use crate::{Instruction, OpCode, VmError, VmResult};
use std::collections::{BTreeSet, HashMap};

/// An immutable script whose instructions have all been decoded and whose
/// jump targets are known to land on instruction boundaries.
#[derive(Debug, Clone)]
pub struct Script {
    bytes: Vec<u8>,
    /// Decoded instructions keyed by offset.
    instructions: HashMap<usize, Instruction>,
}

impl Script {
    /// Decodes and validates a script.
    ///
    /// Validation is state-independent: every opcode must be known, no
    /// operand may run past the script end, and every static jump target
    /// must land on an instruction boundary inside the script.
    pub fn new(bytes: Vec<u8>) -> VmResult<Script> {
        let mut instructions = HashMap::new();
        let mut boundaries = BTreeSet::new();
        let mut position = 0usize;
        while position < bytes.len() {
            let instruction = Instruction::decode(&bytes, position)?;
            boundaries.insert(position);
            let next = instruction.next_position();
            instructions.insert(position, instruction);
            position = next;
        }
        boundaries.insert(bytes.len());

        let script = Script {
            bytes,
            instructions,
        };
        script.validate_targets(&boundaries)?;
        Ok(script)
    }

    fn validate_targets(&self, boundaries: &BTreeSet<usize>) -> VmResult<()> {
        for instruction in self.instructions.values() {
            let targets: Vec<usize> = match instruction.opcode() {
                OpCode::Jmp
                | OpCode::JmpIf
                | OpCode::JmpIfNot
                | OpCode::JmpEq
                | OpCode::JmpNe
                | OpCode::JmpGt
                | OpCode::JmpGe
                | OpCode::JmpLt
                | OpCode::JmpLe
                | OpCode::Call
                | OpCode::EndTry => vec![instruction.jump_target_short()?],
                OpCode::JmpL
                | OpCode::JmpIfL
                | OpCode::JmpIfNotL
                | OpCode::JmpEqL
                | OpCode::JmpNeL
                | OpCode::JmpGtL
                | OpCode::JmpGeL
                | OpCode::JmpLtL
                | OpCode::JmpLeL
                | OpCode::CallL
                | OpCode::EndTryL
                | OpCode::PushA => vec![instruction.jump_target_long()?],
                OpCode::Try => {
                    let catch = instruction.checked_target(instruction.operand_i8(0) as i32)?;
                    let finally = instruction.checked_target(instruction.operand_i8(1) as i32)?;
                    collect_try_targets(instruction.position(), catch, finally)
                }
                OpCode::TryL => {
                    let catch = instruction.checked_target(instruction.operand_i32(0))?;
                    let finally = instruction.checked_target(instruction.operand_i32(4))?;
                    collect_try_targets(instruction.position(), catch, finally)
                }
                _ => continue,
            };
            // The one-past-the-end boundary is a legal target; executing it
            // behaves as RET.
            for target in targets {
                if !boundaries.contains(&target) {
                    return Err(VmError::BadScript(format!(
                        "jump target {target} of {:?} at {} is not an instruction boundary",
                        instruction.opcode(),
                        instruction.position()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The raw script bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length of the script.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The instruction at `position`, which must be a boundary.
    pub fn instruction_at(&self, position: usize) -> VmResult<&Instruction> {
        self.instructions.get(&position).ok_or_else(|| {
            VmError::BadScript(format!("no instruction boundary at {position}"))
        })
    }
}

fn collect_try_targets(position: usize, catch: usize, finally: usize) -> Vec<usize> {
    // An offset of zero means the block is absent.
    let mut targets = Vec::new();
    if catch != position {
        targets.push(catch);
    }
    if finally != position {
        targets.push(finally);
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_script_decodes() {
        // PUSH1 PUSH2 ADD RET
        let script = Script::new(vec![0x11, 0x12, 0x9E, 0x40]).unwrap();
        assert_eq!(script.instruction_at(2).unwrap().opcode(), OpCode::Add);
    }

    #[test]
    fn unknown_opcode_fails_validation() {
        assert!(Script::new(vec![0x11, 0xFE]).is_err());
    }

    #[test]
    fn pushdata_overrun_fails_validation() {
        assert!(Script::new(vec![0x0C, 0x10, 0x00]).is_err());
    }

    #[test]
    fn jump_outside_script_fails_validation() {
        // JMP +0x40 lands far past the end.
        assert!(Script::new(vec![0x22, 0x40]).is_err());
    }

    #[test]
    fn jump_into_operand_bytes_fails_validation() {
        // JMP +3 lands in the middle of the PUSHINT16 operand.
        assert!(Script::new(vec![0x22, 0x03, 0x01, 0xAA, 0xBB, 0x40]).is_err());
    }
}
