//! Slot opcodes: static fields, locals and arguments.

use crate::{ExecutionEngine, Instruction, OpCode, Slot, VmError, VmResult};

/// Which slot family an opcode addresses.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Static,
    Local,
    Argument,
}

impl ExecutionEngine {
    pub(crate) fn execute_slot_op(&mut self, instruction: &Instruction) -> VmResult<()> {
        use OpCode::*;
        let opcode = instruction.opcode();
        match opcode {
            InitSSlot => {
                let count = instruction.operand_u8() as usize;
                if count == 0 {
                    return Err(VmError::BadScript("INITSSLOT with zero fields".into()));
                }
                let counter = self.reference_counter().clone();
                let context = self
                    .current_context_mut()
                    .ok_or(VmError::InvalidOperation("no context".into()))?;
                if context.static_fields.borrow().is_some() {
                    return Err(VmError::InvalidOperation(
                        "static fields already initialized".into(),
                    ));
                }
                *context.static_fields.borrow_mut() = Some(Slot::new(count, counter));
                Ok(())
            }
            InitSlot => {
                let local_count = instruction.operand_u8() as usize;
                let argument_count = instruction.operand_i8(1) as u8 as usize;
                if local_count == 0 && argument_count == 0 {
                    return Err(VmError::BadScript(
                        "INITSLOT with zero locals and arguments".into(),
                    ));
                }
                let counter = self.reference_counter().clone();
                // Arguments are popped top-first: argument 0 is the top item.
                let mut arguments = Vec::with_capacity(argument_count);
                for _ in 0..argument_count {
                    arguments.push(self.pop()?);
                }
                let context = self
                    .current_context_mut()
                    .ok_or(VmError::InvalidOperation("no context".into()))?;
                if context.local_variables.is_some() || context.arguments.is_some() {
                    return Err(VmError::InvalidOperation("slots already initialized".into()));
                }
                if local_count > 0 {
                    context.local_variables = Some(Slot::new(local_count, counter.clone()));
                }
                if argument_count > 0 {
                    context.arguments = Some(Slot::from_items(arguments, counter));
                }
                Ok(())
            }
            LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5 | LdSFld6 => {
                self.load_slot(SlotKind::Static, opcode as u8 as usize - LdSFld0 as u8 as usize)
            }
            LdSFld => self.load_slot(SlotKind::Static, instruction.operand_u8() as usize),
            StSFld0 | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5 | StSFld6 => {
                self.store_slot(SlotKind::Static, opcode as u8 as usize - StSFld0 as u8 as usize)
            }
            StSFld => self.store_slot(SlotKind::Static, instruction.operand_u8() as usize),
            LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6 => {
                self.load_slot(SlotKind::Local, opcode as u8 as usize - LdLoc0 as u8 as usize)
            }
            LdLoc => self.load_slot(SlotKind::Local, instruction.operand_u8() as usize),
            StLoc0 | StLoc1 | StLoc2 | StLoc3 | StLoc4 | StLoc5 | StLoc6 => {
                self.store_slot(SlotKind::Local, opcode as u8 as usize - StLoc0 as u8 as usize)
            }
            StLoc => self.store_slot(SlotKind::Local, instruction.operand_u8() as usize),
            LdArg0 | LdArg1 | LdArg2 | LdArg3 | LdArg4 | LdArg5 | LdArg6 => {
                self.load_slot(SlotKind::Argument, opcode as u8 as usize - LdArg0 as u8 as usize)
            }
            LdArg => self.load_slot(SlotKind::Argument, instruction.operand_u8() as usize),
            StArg0 | StArg1 | StArg2 | StArg3 | StArg4 | StArg5 | StArg6 => {
                self.store_slot(SlotKind::Argument, opcode as u8 as usize - StArg0 as u8 as usize)
            }
            StArg => self.store_slot(SlotKind::Argument, instruction.operand_u8() as usize),
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a slot opcode"
            ))),
        }
    }

    fn load_slot(&mut self, kind: SlotKind, index: usize) -> VmResult<()> {
        let context = self
            .current_context()
            .ok_or(VmError::InvalidOperation("no context".into()))?;
        let item = match kind {
            SlotKind::Static => context
                .static_fields
                .borrow()
                .as_ref()
                .ok_or(VmError::InvalidOperation("static slot not initialized".into()))?
                .get(index)?,
            SlotKind::Local => context
                .local_variables
                .as_ref()
                .ok_or(VmError::InvalidOperation("local slot not initialized".into()))?
                .get(index)?,
            SlotKind::Argument => context
                .arguments
                .as_ref()
                .ok_or(VmError::InvalidOperation("argument slot not initialized".into()))?
                .get(index)?,
        };
        self.push(item)
    }

    fn store_slot(&mut self, kind: SlotKind, index: usize) -> VmResult<()> {
        let item = self.pop()?;
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("no context".into()))?;
        match kind {
            SlotKind::Static => context
                .static_fields
                .borrow_mut()
                .as_mut()
                .ok_or(VmError::InvalidOperation("static slot not initialized".into()))?
                .set(index, item),
            SlotKind::Local => context
                .local_variables
                .as_mut()
                .ok_or(VmError::InvalidOperation("local slot not initialized".into()))?
                .set(index, item),
            SlotKind::Argument => context
                .arguments
                .as_mut()
                .ok_or(VmError::InvalidOperation("argument slot not initialized".into()))?
                .set(index, item),
        }
    }
}
