//! Storage contexts handed to contracts.

/// A capability to read (and possibly write) one contract's storage space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    /// The owning contract id; all keys are scoped under it.
    pub id: i32,
    /// Read-only contexts refuse writes regardless of call flags.
    pub is_read_only: bool,
}

impl StorageContext {
    pub fn new(id: i32, is_read_only: bool) -> Self {
        Self { id, is_read_only }
    }

    /// A read-only copy of this context.
    pub fn as_read_only(&self) -> Self {
        Self {
            id: self.id,
            is_read_only: true,
        }
    }
}
