//! Stack-manipulation opcodes.

use crate::{ExecutionEngine, OpCode, StackItem, VmError, VmResult};

impl ExecutionEngine {
    pub(crate) fn execute_stack_op(&mut self, opcode: OpCode) -> VmResult<()> {
        match opcode {
            OpCode::Depth => {
                let depth = self
                    .current_context()
                    .map(|context| context.evaluation_stack.borrow().len())
                    .unwrap_or(0);
                self.push(StackItem::from_int(depth as i64))
            }
            OpCode::Drop => {
                self.pop()?;
                Ok(())
            }
            OpCode::Nip => {
                self.with_stack(|stack| stack.remove(1).map(|_| ()))
            }
            OpCode::XDrop => {
                let depth = self.pop_index()?;
                self.with_stack(|stack| stack.remove(depth).map(|_| ()))
            }
            OpCode::Clear => self.with_stack(|stack| {
                stack.clear();
                Ok(())
            }),
            OpCode::Dup => {
                let top = self.peek(0)?;
                self.push(top)
            }
            OpCode::Over => {
                let item = self.peek(1)?;
                self.push(item)
            }
            OpCode::Pick => {
                let depth = self.pop_index()?;
                let item = self.peek(depth)?;
                self.push(item)
            }
            OpCode::Tuck => {
                let top = self.peek(0)?;
                self.with_stack(|stack| stack.insert(2, top))
            }
            OpCode::Swap => self.with_stack(|stack| {
                let item = stack.remove(1)?;
                stack.push(item);
                Ok(())
            }),
            OpCode::Rot => self.with_stack(|stack| {
                let item = stack.remove(2)?;
                stack.push(item);
                Ok(())
            }),
            OpCode::Roll => {
                let depth = self.pop_index()?;
                if depth == 0 {
                    return Ok(());
                }
                self.with_stack(|stack| {
                    let item = stack.remove(depth)?;
                    stack.push(item);
                    Ok(())
                })
            }
            OpCode::Reverse3 => self.with_stack(|stack| stack.reverse(3)),
            OpCode::Reverse4 => self.with_stack(|stack| stack.reverse(4)),
            OpCode::ReverseN => {
                let count = self.pop_index()?;
                self.with_stack(|stack| stack.reverse(count))
            }
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a stack opcode"
            ))),
        }
    }

    /// Runs `f` against the current context's evaluation stack.
    pub(crate) fn with_stack<R>(
        &mut self,
        f: impl FnOnce(&mut crate::EvaluationStack) -> VmResult<R>,
    ) -> VmResult<R> {
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("no context".into()))?;
        let stack = context.evaluation_stack.clone();
        let mut stack = stack.borrow_mut();
        f(&mut stack)
    }
}
