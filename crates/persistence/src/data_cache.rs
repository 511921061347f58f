//! The layered, copy-on-write cache over the backing store.

use crate::{
    PersistenceError, PersistenceResult, SeekDirection, StorageItem, StorageKey, StoreSnapshot,
    TrackState, Trackable,
};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What a [`DataCache`] sits on top of: either a store snapshot or another
/// cache. Keys cross this boundary in their serialized form so the backend
/// does not need to understand their structure.
pub trait CacheBackend: Send + Sync {
    fn backend_try_get(&self, key: &StorageKey) -> Option<StorageItem>;
    fn backend_contains(&self, key: &StorageKey) -> bool;
    /// Entries from `key_or_prefix` (inclusive) in `direction`; an empty
    /// slice scans everything.
    fn backend_seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)>;
    fn backend_put(&self, key: &StorageKey, item: &StorageItem);
    fn backend_delete(&self, key: &StorageKey);
}

/// Adapts a [`StoreSnapshot`] to the [`CacheBackend`] surface.
pub struct SnapshotBackend {
    snapshot: Box<dyn StoreSnapshot>,
}

impl SnapshotBackend {
    pub fn new(snapshot: Box<dyn StoreSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Atomically applies everything committed into this backend to the
    /// underlying store.
    pub fn commit_to_store(&self) {
        self.snapshot.commit();
    }
}

impl CacheBackend for SnapshotBackend {
    fn backend_try_get(&self, key: &StorageKey) -> Option<StorageItem> {
        self.snapshot.try_get(&key.to_bytes()).map(StorageItem::new)
    }

    fn backend_contains(&self, key: &StorageKey) -> bool {
        self.snapshot.contains(&key.to_bytes())
    }

    fn backend_seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)> {
        self.snapshot
            .seek(key_or_prefix, direction)
            .into_iter()
            .filter_map(|(k, v)| StorageKey::from_bytes(&k).map(|key| (key, StorageItem::new(v))))
            .collect()
    }

    fn backend_put(&self, key: &StorageKey, item: &StorageItem) {
        self.snapshot.put(&key.to_bytes(), item.value());
    }

    fn backend_delete(&self, key: &StorageKey) {
        self.snapshot.delete(&key.to_bytes());
    }
}

/// A copy-on-write overlay over a [`CacheBackend`].
///
/// Reads fall through to the backend and are recorded locally; writes stay
/// local until [`commit`](DataCache::commit) replays them downwards. Cloning
/// with [`clone_cache`](DataCache::clone_cache) produces a child overlay
/// whose backend is this cache.
pub struct DataCache {
    entries: Mutex<HashMap<StorageKey, Trackable>>,
    backend: Arc<dyn CacheBackend>,
}

impl DataCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            backend,
        }
    }

    /// A child cache overlaying this one.
    pub fn clone_cache(self: &Arc<Self>) -> DataCache {
        DataCache::new(Arc::clone(self) as Arc<dyn CacheBackend>)
    }

    /// Reads an item; absent keys are an error.
    pub fn get(&self, key: &StorageKey) -> PersistenceResult<StorageItem> {
        self.try_get(key).ok_or(PersistenceError::NotFound)
    }

    /// Reads an item, recording a read-through entry on a backend hit.
    pub fn try_get(&self, key: &StorageKey) -> Option<StorageItem> {
        let mut entries = self.entries.lock();
        if let Some(trackable) = entries.get(key) {
            return trackable
                .state
                .is_live()
                .then(|| trackable.item.clone());
        }
        let item = self.backend.backend_try_get(key)?;
        entries.insert(key.clone(), Trackable::new(item.clone(), TrackState::None));
        Some(item)
    }

    /// Whether the key is readable, without caching its value locally.
    pub fn contains(&self, key: &StorageKey) -> bool {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(trackable) => trackable.state.is_live(),
            None => self.backend.backend_contains(key),
        }
    }

    /// Inserts a fresh entry. Fails if this layer already holds a live value
    /// for the key.
    pub fn add(&self, key: &StorageKey, item: StorageItem) -> PersistenceResult<()> {
        let mut entries = self.entries.lock();
        match entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let trackable = occupied.get_mut();
                match trackable.state {
                    TrackState::Deleted => {
                        trackable.item = item;
                        trackable.state = TrackState::Changed;
                        Ok(())
                    }
                    TrackState::NotFound => {
                        trackable.item = item;
                        trackable.state = TrackState::Added;
                        Ok(())
                    }
                    TrackState::None | TrackState::Added | TrackState::Changed => {
                        Err(PersistenceError::AlreadyExists)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Trackable::new(item, TrackState::Added));
                Ok(())
            }
        }
    }

    /// Deletes an entry; deleting an absent key is a no-op.
    pub fn delete(&self, key: &StorageKey) {
        let mut entries = self.entries.lock();
        match entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let trackable = occupied.get_mut();
                trackable.state = match trackable.state {
                    TrackState::Added => TrackState::NotFound,
                    TrackState::None | TrackState::Changed => TrackState::Deleted,
                    unchanged @ (TrackState::Deleted | TrackState::NotFound) => unchanged,
                };
            }
            Entry::Vacant(vacant) => {
                if let Some(item) = self.backend.backend_try_get(key) {
                    vacant.insert(Trackable::new(item, TrackState::Deleted));
                }
            }
        }
    }

    /// Upserts an entry, used by the storage syscalls and by child commits.
    pub fn put(&self, key: &StorageKey, item: StorageItem) {
        let mut entries = self.entries.lock();
        match entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let trackable = occupied.get_mut();
                trackable.state = match trackable.state {
                    TrackState::Added | TrackState::NotFound => TrackState::Added,
                    TrackState::None | TrackState::Changed | TrackState::Deleted => {
                        TrackState::Changed
                    }
                };
                trackable.item = item;
            }
            Entry::Vacant(vacant) => {
                let state = if self.backend.backend_contains(key) {
                    TrackState::Changed
                } else {
                    TrackState::Added
                };
                vacant.insert(Trackable::new(item, state));
            }
        }
    }

    /// Loads an entry for mutation, marking it changed. Absent keys are an
    /// error.
    pub fn change<F>(&self, key: &StorageKey, mutate: F) -> PersistenceResult<StorageItem>
    where
        F: FnOnce(&mut StorageItem),
    {
        let mut entries = self.entries.lock();
        let trackable = match entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let trackable = occupied.into_mut();
                if !trackable.state.is_live() {
                    return Err(PersistenceError::NotFound);
                }
                trackable
            }
            Entry::Vacant(vacant) => {
                let item = self
                    .backend
                    .backend_try_get(key)
                    .ok_or(PersistenceError::NotFound)?;
                vacant.insert(Trackable::new(item, TrackState::None))
            }
        };
        if trackable.state == TrackState::None {
            trackable.state = TrackState::Changed;
        }
        mutate(&mut trackable.item);
        Ok(trackable.item.clone())
    }

    /// Loads an entry for mutation, creating it from `default` when absent.
    pub fn change_or_add<F>(&self, key: &StorageKey, default: StorageItem, mutate: F) -> StorageItem
    where
        F: FnOnce(&mut StorageItem),
    {
        let mut entries = self.entries.lock();
        let trackable = match entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let trackable = occupied.into_mut();
                match trackable.state {
                    TrackState::Deleted => {
                        trackable.item = default;
                        trackable.state = TrackState::Changed;
                    }
                    TrackState::NotFound => {
                        trackable.item = default;
                        trackable.state = TrackState::Added;
                    }
                    TrackState::None => trackable.state = TrackState::Changed,
                    TrackState::Added | TrackState::Changed => {}
                }
                trackable
            }
            Entry::Vacant(vacant) => match self.backend.backend_try_get(key) {
                Some(item) => vacant.insert(Trackable::new(item, TrackState::Changed)),
                None => vacant.insert(Trackable::new(default, TrackState::Added)),
            },
        };
        mutate(&mut trackable.item);
        trackable.item.clone()
    }

    /// Reads an entry, creating it from `default` when absent. The created
    /// entry is tracked as added; an existing one is left untouched.
    pub fn get_or_add(&self, key: &StorageKey, default: StorageItem) -> StorageItem {
        let mut entries = self.entries.lock();
        let trackable = match entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let trackable = occupied.into_mut();
                match trackable.state {
                    TrackState::Deleted => {
                        trackable.item = default;
                        trackable.state = TrackState::Changed;
                    }
                    TrackState::NotFound => {
                        trackable.item = default;
                        trackable.state = TrackState::Added;
                    }
                    _ => {}
                }
                trackable
            }
            Entry::Vacant(vacant) => match self.backend.backend_try_get(key) {
                Some(item) => vacant.insert(Trackable::new(item, TrackState::None)),
                None => vacant.insert(Trackable::new(default, TrackState::Added)),
            },
        };
        trackable.item.clone()
    }

    /// Entries whose serialized key starts with `prefix`, merged across this
    /// layer and the backend.
    ///
    /// Going backward the scan starts just before the key following the
    /// prefix, which is why an all-`0xFF` prefix cannot be iterated in that
    /// direction.
    pub fn find(
        &self,
        prefix: &[u8],
        direction: SeekDirection,
    ) -> PersistenceResult<Vec<(StorageKey, StorageItem)>> {
        let seek_key = match direction {
            SeekDirection::Forward => prefix.to_vec(),
            // An empty prefix scans everything from the end; otherwise start
            // just before the first key past the prefix range.
            SeekDirection::Backward if prefix.is_empty() => Vec::new(),
            SeekDirection::Backward => match next_after_prefix(prefix) {
                Some(key) => key,
                None => {
                    return Err(PersistenceError::InvalidOperation(
                        "cannot seek backward over an all-0xFF prefix".into(),
                    ))
                }
            },
        };
        let mut results = self.merged_seek(&seek_key, direction);
        results.retain(|(key, _)| key.to_bytes().starts_with(prefix));
        Ok(results)
    }

    /// Entries from `key` (inclusive) onwards in `direction`.
    pub fn seek(
        &self,
        key: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)> {
        self.merged_seek(key, direction)
    }

    /// Entries in a half-open interval: forward scans `[start, end)`
    /// ascending, backward scans `(end, start]` descending.
    pub fn find_range(
        &self,
        start: &[u8],
        end: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)> {
        let mut results = self.merged_seek(start, direction);
        match direction {
            SeekDirection::Forward => results.retain(|(key, _)| key.to_bytes().as_slice() < end),
            SeekDirection::Backward => results.retain(|(key, _)| key.to_bytes().as_slice() > end),
        }
        results
    }

    /// Replays local changes into the backend and clears this layer.
    pub fn commit(&self) {
        let mut entries = self.entries.lock();
        for (key, trackable) in entries.drain() {
            match trackable.state {
                TrackState::Added | TrackState::Changed => {
                    self.backend.backend_put(&key, &trackable.item)
                }
                TrackState::Deleted => self.backend.backend_delete(&key),
                TrackState::None | TrackState::NotFound => {}
            }
        }
    }

    /// The tracking state of a key in this layer, if any.
    pub fn track_state(&self, key: &StorageKey) -> Option<TrackState> {
        self.entries.lock().get(key).map(|t| t.state)
    }

    fn merged_seek(
        &self,
        seek_key: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)> {
        // Overlay entries win over backend entries with the same key; dead
        // local entries hide their backend counterparts entirely.
        let mut merged: BTreeMap<Vec<u8>, (StorageKey, Option<StorageItem>)> = BTreeMap::new();
        for (key, item) in self.backend.backend_seek(seek_key, direction) {
            merged.insert(key.to_bytes(), (key, Some(item)));
        }
        let entries = self.entries.lock();
        for (key, trackable) in entries.iter() {
            let key_bytes = key.to_bytes();
            let in_range = match direction {
                SeekDirection::Forward => key_bytes.as_slice() >= seek_key,
                SeekDirection::Backward => {
                    seek_key.is_empty() || key_bytes.as_slice() <= seek_key
                }
            };
            if !in_range {
                continue;
            }
            let value = trackable
                .state
                .is_live()
                .then(|| trackable.item.clone());
            merged.insert(key_bytes, (key.clone(), value));
        }
        drop(entries);

        let live = merged
            .into_values()
            .filter_map(|(key, item)| item.map(|item| (key, item)));
        match direction {
            SeekDirection::Forward => live.collect(),
            SeekDirection::Backward => {
                let mut results: Vec<_> = live.collect();
                results.reverse();
                results
            }
        }
    }
}

impl CacheBackend for DataCache {
    fn backend_try_get(&self, key: &StorageKey) -> Option<StorageItem> {
        self.try_get(key)
    }

    fn backend_contains(&self, key: &StorageKey) -> bool {
        self.contains(key)
    }

    fn backend_seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Vec<(StorageKey, StorageItem)> {
        self.merged_seek(key_or_prefix, direction)
    }

    fn backend_put(&self, key: &StorageKey, item: &StorageItem) {
        self.put(key, item.clone());
    }

    fn backend_delete(&self, key: &StorageKey) {
        self.delete(key);
    }
}

/// The smallest key strictly greater than every key starting with `prefix`:
/// the prefix with its last non-0xFF byte incremented and the tail dropped.
fn next_after_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let position = prefix.iter().rposition(|&byte| byte != 0xFF)?;
    let mut key = prefix[..=position].to_vec();
    key[position] += 1;
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_after_prefix_increments_last_byte() {
        assert_eq!(next_after_prefix(&[0x01, 0x02]), Some(vec![0x01, 0x03]));
        assert_eq!(next_after_prefix(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(next_after_prefix(&[0xFF, 0xFF]), None);
    }
}
