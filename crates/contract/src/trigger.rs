//! Execution triggers.

/// Why the application engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TriggerType {
    /// System hook before a block's transactions.
    OnPersist = 0x01,
    /// System hook after a block's transactions.
    PostPersist = 0x02,
    /// Witness verification.
    Verification = 0x20,
    /// Ordinary transaction execution.
    Application = 0x40,
}
