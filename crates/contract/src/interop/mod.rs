//! The system-call surface: descriptors and their handlers.

mod contract;
mod crypto;
mod runtime;
mod storage;

pub use storage::{FindOptions, StorageIterator};

use crate::application_engine::ContainerRef;
use crate::{CallFlags, LogEventArgs, NotifyEventArgs, TriggerType};
use neo3_config::ProtocolSettings;
use neo3_core::Block;
use neo3_persistence::DataCache;
use neo3_vm::{ExecutionEngine, VmResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

/// Host-side state shared by every system call of one execution.
pub struct EngineContext {
    pub(crate) trigger: TriggerType,
    pub(crate) container: ContainerRef,
    pub(crate) snapshot: Arc<DataCache>,
    pub(crate) persisting_block: Option<Arc<Block>>,
    pub(crate) settings: Arc<ProtocolSettings>,
    pub(crate) gas_limit: i64,
    pub(crate) gas_consumed: i64,
    pub(crate) exec_fee_factor: u32,
    pub(crate) storage_price: u32,
    pub(crate) notifications: Vec<NotifyEventArgs>,
    pub(crate) logs: Vec<LogEventArgs>,
    pub(crate) observers: Vec<Arc<dyn crate::EngineObserver>>,
    pub(crate) random_state: [u8; 16],
}

/// One registered system call.
pub struct InteropDescriptor {
    pub name: &'static str,
    /// Little-endian u32 of the first four bytes of SHA-256 of the name.
    pub hash: u32,
    /// Base price in datoshi, scaled by the execution fee factor.
    pub price: i64,
    pub required_flags: CallFlags,
    pub handler: fn(&mut EngineContext, &mut ExecutionEngine) -> VmResult<()>,
}

/// The descriptor hash of a system-call name.
pub fn syscall_hash(name: &str) -> u32 {
    let digest = neo3_crypto::sha256(name.as_bytes());
    u32::from_le_bytes(digest[..4].try_into().expect("4 bytes of a digest"))
}

macro_rules! descriptors {
    ($(($name:literal, $price:expr, $flags:expr, $handler:path)),* $(,)?) => {
        vec![
            $(InteropDescriptor {
                name: $name,
                hash: syscall_hash($name),
                price: $price,
                required_flags: $flags,
                handler: $handler,
            },)*
        ]
    };
}

static DESCRIPTORS: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    let list = descriptors![
        // Runtime
        ("System.Runtime.Platform", 1 << 3, CallFlags::NONE, runtime::platform),
        ("System.Runtime.GetNetwork", 1 << 3, CallFlags::NONE, runtime::get_network),
        ("System.Runtime.GetAddressVersion", 1 << 3, CallFlags::NONE, runtime::get_address_version),
        ("System.Runtime.GetTrigger", 1 << 3, CallFlags::NONE, runtime::get_trigger),
        ("System.Runtime.GetTime", 1 << 3, CallFlags::NONE, runtime::get_time),
        ("System.Runtime.GetScriptContainer", 1 << 3, CallFlags::NONE, runtime::get_script_container),
        ("System.Runtime.GetExecutingScriptHash", 1 << 4, CallFlags::NONE, runtime::get_executing_script_hash),
        ("System.Runtime.GetCallingScriptHash", 1 << 4, CallFlags::NONE, runtime::get_calling_script_hash),
        ("System.Runtime.GetEntryScriptHash", 1 << 4, CallFlags::NONE, runtime::get_entry_script_hash),
        ("System.Runtime.LoadScript", 1 << 15, CallFlags::ALLOW_CALL, runtime::load_script),
        ("System.Runtime.CheckWitness", 1 << 10, CallFlags::NONE, runtime::check_witness),
        ("System.Runtime.GetRandom", 0, CallFlags::NONE, runtime::get_random),
        ("System.Runtime.Log", 1 << 15, CallFlags::ALLOW_NOTIFY, runtime::log),
        ("System.Runtime.Notify", 1 << 15, CallFlags::ALLOW_NOTIFY, runtime::notify),
        ("System.Runtime.GetNotifications", 1 << 12, CallFlags::NONE, runtime::get_notifications),
        ("System.Runtime.GasLeft", 1 << 4, CallFlags::NONE, runtime::gas_left),
        ("System.Runtime.BurnGas", 1 << 4, CallFlags::NONE, runtime::burn_gas),
        // Storage
        ("System.Storage.GetContext", 1 << 4, CallFlags::READ_STATES, storage::get_context),
        ("System.Storage.GetReadOnlyContext", 1 << 4, CallFlags::READ_STATES, storage::get_read_only_context),
        ("System.Storage.AsReadOnly", 1 << 4, CallFlags::READ_STATES, storage::as_read_only),
        ("System.Storage.Get", 1 << 15, CallFlags::READ_STATES, storage::get),
        ("System.Storage.Put", 1 << 15, CallFlags::WRITE_STATES, storage::put),
        ("System.Storage.Delete", 1 << 15, CallFlags::WRITE_STATES, storage::delete),
        ("System.Storage.Find", 1 << 15, CallFlags::READ_STATES, storage::find),
        ("System.Iterator.Next", 1 << 15, CallFlags::NONE, storage::iterator_next),
        ("System.Iterator.Value", 1 << 4, CallFlags::NONE, storage::iterator_value),
        // Contract
        ("System.Contract.Call", 1 << 15, CallFlags::READ_STATES | CallFlags::ALLOW_CALL, contract::call),
        ("System.Contract.CallNative", 0, CallFlags::NONE, contract::call_native),
        ("System.Contract.GetCallFlags", 1 << 10, CallFlags::NONE, contract::get_call_flags),
        ("System.Contract.CreateStandardAccount", 1 << 8, CallFlags::NONE, contract::create_standard_account),
        ("System.Contract.CreateMultisigAccount", 1 << 8, CallFlags::NONE, contract::create_multisig_account),
        ("System.Contract.NativeOnPersist", 0, CallFlags::STATES, contract::native_on_persist),
        ("System.Contract.NativePostPersist", 0, CallFlags::STATES, contract::native_post_persist),
        // Crypto
        ("System.Crypto.CheckSig", 1 << 15, CallFlags::NONE, crypto::check_sig),
        ("System.Crypto.CheckMultisig", 0, CallFlags::NONE, crypto::check_multisig),
    ];
    list.into_iter()
        .map(|descriptor| (descriptor.hash, descriptor))
        .collect()
});

/// Looks up a registered system call.
pub fn descriptor_by_hash(hash: u32) -> Option<&'static InteropDescriptor> {
    DESCRIPTORS.get(&hash)
}

/// Looks up a registered system call by name.
pub fn descriptor_by_name(name: &str) -> Option<&'static InteropDescriptor> {
    DESCRIPTORS.get(&syscall_hash(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_match_the_vm_templates() {
        assert_eq!(
            syscall_hash("System.Crypto.CheckSig"),
            neo3_vm::CHECKSIG_SYSCALL
        );
        assert_eq!(
            syscall_hash("System.Crypto.CheckMultisig"),
            neo3_vm::CHECKMULTISIG_SYSCALL
        );
    }

    #[test]
    fn registry_is_collision_free_and_resolvable() {
        assert!(descriptor_by_name("System.Contract.Call").is_some());
        assert!(descriptor_by_name("System.Storage.Put").is_some());
        assert!(descriptor_by_name("No.Such.Syscall").is_none());
    }
}
