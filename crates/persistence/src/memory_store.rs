//! In-memory store, the reference backend implementation.

use crate::{SeekDirection, Store, StoreSnapshot};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// A [`Store`] over a `BTreeMap`, used by tests and light deployments.
#[derive(Default)]
pub struct MemoryStore {
    map: Arc<RwLock<Map>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

fn seek_map(map: &Map, key_or_prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
    match direction {
        SeekDirection::Forward => map
            .range((Bound::Included(key_or_prefix.to_vec()), Bound::Unbounded))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        SeekDirection::Backward => {
            let upper: Bound<Vec<u8>> = if key_or_prefix.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(key_or_prefix.to_vec())
            };
            let mut entries: Vec<_> = map
                .range((Bound::Unbounded, upper))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            entries.reverse();
            entries
        }
    }
}

impl Store for MemoryStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.read().get(key).cloned()
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.map.read().contains_key(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        self.map.write().insert(key.to_vec(), value.to_vec());
    }

    fn delete(&self, key: &[u8]) {
        self.map.write().remove(key);
    }

    fn seek(&self, key_or_prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        seek_map(&self.map.read(), key_or_prefix, direction)
    }

    fn snapshot(&self) -> Box<dyn StoreSnapshot> {
        Box::new(MemorySnapshot {
            view: self.map.read().clone(),
            batch: Mutex::new(Vec::new()),
            store: Arc::clone(&self.map),
        })
    }
}

/// Snapshot of a [`MemoryStore`]: a frozen copy of the map plus a write batch.
struct MemorySnapshot {
    view: Map,
    batch: Mutex<Vec<(Vec<u8>, Option<Vec<u8>>)>>,
    store: Arc<RwLock<Map>>,
}

impl MemorySnapshot {
    /// The view with this snapshot's own pending writes applied.
    fn effective(&self) -> Map {
        let mut map = self.view.clone();
        for (key, value) in self.batch.lock().iter() {
            match value {
                Some(value) => {
                    map.insert(key.clone(), value.clone());
                }
                None => {
                    map.remove(key);
                }
            }
        }
        map
    }
}

impl StoreSnapshot for MemorySnapshot {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut result = self.view.get(key).cloned();
        for (batch_key, value) in self.batch.lock().iter() {
            if batch_key.as_slice() == key {
                result = value.clone();
            }
        }
        result
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.try_get(key).is_some()
    }

    fn seek(&self, key_or_prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        seek_map(&self.effective(), key_or_prefix, direction)
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        self.batch.lock().push((key.to_vec(), Some(value.to_vec())));
    }

    fn delete(&self, key: &[u8]) {
        self.batch.lock().push((key.to_vec(), None));
    }

    fn commit(&self) {
        let mut map = self.store.write();
        for (key, value) in self.batch.lock().drain(..) {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_isolation() {
        let store = MemoryStore::new();
        store.put(b"a", b"1");
        let snapshot = store.snapshot();
        store.put(b"a", b"2");
        // The snapshot still sees the value at creation time.
        assert_eq!(snapshot.try_get(b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn batch_is_atomic_until_commit() {
        let store = MemoryStore::new();
        let snapshot = store.snapshot();
        snapshot.put(b"k", b"v");
        assert!(!store.contains(b"k"));
        snapshot.commit();
        assert_eq!(store.try_get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn seek_directions() {
        let store = MemoryStore::new();
        for key in [b"aa", b"ab", b"ba"] {
            store.put(key, b"x");
        }
        let forward = store.seek(b"ab", SeekDirection::Forward);
        assert_eq!(
            forward.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"ab".to_vec(), b"ba".to_vec()]
        );
        let backward = store.seek(b"ab", SeekDirection::Backward);
        assert_eq!(
            backward.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"ab".to_vec(), b"aa".to_vec()]
        );
    }

    #[test]
    fn snapshot_delete_round_trips() {
        let store = MemoryStore::new();
        store.put(b"k", b"v");
        let snapshot = store.snapshot();
        snapshot.delete(b"k");
        assert!(store.contains(b"k"));
        snapshot.commit();
        assert!(!store.contains(b"k"));
    }
}
