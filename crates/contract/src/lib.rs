//! The contract layer: the application engine hosting the VM, the system
//! call surface, and the native contracts.

mod application_engine;
mod call_flags;
mod contract_state;
mod error;
mod interoperable;
mod nef;
mod notify;
mod storage_context;
mod trigger;

pub mod interop;
pub mod manifest;
pub mod native;

pub use application_engine::{ApplicationEngine, ContainerRef, ContextState, StoreView};
pub use call_flags::CallFlags;
pub use contract_state::{contract_hash, ContractState};
pub use error::{ContractError, ContractResult};
pub use interoperable::{BinarySerializer, Interoperable};
pub use nef::{MethodToken, NefFile, NEF_MAGIC};
pub use notify::{EngineObserver, LogEventArgs, NotifyEventArgs};
pub use storage_context::StorageContext;
pub use trigger::TriggerType;
