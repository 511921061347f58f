//! Splice opcodes: buffers and byte-string surgery.

use crate::{ExecutionEngine, OpCode, StackItem, VmError, VmResult};

impl ExecutionEngine {
    pub(crate) fn execute_splice_op(&mut self, opcode: OpCode) -> VmResult<()> {
        match opcode {
            OpCode::NewBuffer => {
                let size = self.pop_index()?;
                self.check_item_size(size)?;
                self.push(StackItem::from_buffer(vec![0u8; size]))
            }
            OpCode::MemCpy => {
                let count = self.pop_index()?;
                let source_index = self.pop_index()?;
                let source = self.pop()?.to_bytes()?;
                let destination_index = self.pop_index()?;
                let destination = match self.pop()? {
                    StackItem::Buffer(buffer) => buffer,
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "MEMCPY destination must be a buffer, got {:?}",
                            other.item_type()
                        )))
                    }
                };
                if source_index + count > source.len() {
                    return Err(VmError::OutOfRange(format!(
                        "MEMCPY reads {count} bytes at {source_index} of {}",
                        source.len()
                    )));
                }
                let mut destination = destination.borrow_mut();
                if destination_index + count > destination.len() {
                    return Err(VmError::OutOfRange(format!(
                        "MEMCPY writes {count} bytes at {destination_index} of {}",
                        destination.len()
                    )));
                }
                destination[destination_index..destination_index + count]
                    .copy_from_slice(&source[source_index..source_index + count]);
                Ok(())
            }
            OpCode::Cat => {
                let b = self.pop()?.to_bytes()?;
                let a = self.pop()?.to_bytes()?;
                self.check_item_size(a.len() + b.len())?;
                let mut joined = a;
                joined.extend_from_slice(&b);
                self.push(StackItem::from_buffer(joined))
            }
            OpCode::SubStr => {
                let count = self.pop_index()?;
                let index = self.pop_index()?;
                let data = self.pop()?.to_bytes()?;
                if index + count > data.len() {
                    return Err(VmError::OutOfRange(format!(
                        "SUBSTR of {count} bytes at {index} exceeds length {}",
                        data.len()
                    )));
                }
                self.push(StackItem::from_buffer(data[index..index + count].to_vec()))
            }
            OpCode::Left => {
                let count = self.pop_index()?;
                let data = self.pop()?.to_bytes()?;
                if count > data.len() {
                    return Err(VmError::OutOfRange(format!(
                        "LEFT of {count} bytes exceeds length {}",
                        data.len()
                    )));
                }
                self.push(StackItem::from_buffer(data[..count].to_vec()))
            }
            OpCode::Right => {
                let count = self.pop_index()?;
                let data = self.pop()?.to_bytes()?;
                if count > data.len() {
                    return Err(VmError::OutOfRange(format!(
                        "RIGHT of {count} bytes exceeds length {}",
                        data.len()
                    )));
                }
                self.push(StackItem::from_buffer(data[data.len() - count..].to_vec()))
            }
            other => Err(VmError::InvalidOperation(format!(
                "{other:?} is not a splice opcode"
            ))),
        }
    }
}
