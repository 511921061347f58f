//! The persistence layer: an abstract key-value store plus the layered,
//! copy-on-write [`DataCache`] the state-transition machinery runs against.
//!
//! The backing store only needs the small [`Store`]/[`StoreSnapshot`]
//! surface; everything about change tracking, overlay cloning and prefix
//! iteration lives in the cache and is backend-independent.

mod data_cache;
mod error;
mod memory_store;
mod storage_item;
mod storage_key;
mod store;
mod tracked;

pub use data_cache::{CacheBackend, DataCache, SnapshotBackend};
pub use error::{PersistenceError, PersistenceResult};
pub use memory_store::MemoryStore;
pub use storage_item::StorageItem;
pub use storage_key::StorageKey;
pub use store::{SeekDirection, Store, StoreSnapshot};
pub use tracked::{TrackState, Trackable};
