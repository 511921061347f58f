//! Notifications and logs emitted during execution.

use neo3_core::UInt160;
use neo3_vm::StackItem;

/// An event a contract raised via `System.Runtime.Notify`.
#[derive(Debug, Clone)]
pub struct NotifyEventArgs {
    /// The contract that raised the event.
    pub script_hash: UInt160,
    pub event_name: String,
    /// The event payload, always an array.
    pub state: StackItem,
}

/// A message a contract logged via `System.Runtime.Log`.
#[derive(Debug, Clone)]
pub struct LogEventArgs {
    pub script_hash: UInt160,
    pub message: String,
}

/// Receives notify/log events synchronously, in registration order.
///
/// Observers are registered at engine construction and must not mutate
/// engine state from their callbacks.
pub trait EngineObserver {
    fn on_notify(&self, _event: &NotifyEventArgs) {}
    fn on_log(&self, _event: &LogEventArgs) {}
}
