//! Behavioral tests for the layered data cache.

use neo3_persistence::{
    DataCache, MemoryStore, PersistenceError, SeekDirection, SnapshotBackend, StorageItem,
    StorageKey, Store, TrackState,
};
use std::sync::Arc;

fn key(id: i32, suffix: &[u8]) -> StorageKey {
    StorageKey::new(id).append(suffix)
}

fn item(bytes: &[u8]) -> StorageItem {
    StorageItem::new(bytes.to_vec())
}

fn store_cache(store: &MemoryStore) -> (Arc<DataCache>, Arc<SnapshotBackend>) {
    let backend = Arc::new(SnapshotBackend::new(store.snapshot()));
    let cache = Arc::new(DataCache::new(
        Arc::clone(&backend) as Arc<dyn neo3_persistence::CacheBackend>
    ));
    (cache, backend)
}

#[test]
fn add_tracks_added_and_commit_writes_through() {
    let store = MemoryStore::new();
    let (cache, backend) = store_cache(&store);

    let k = key(1, b"alpha");
    cache.add(&k, item(b"one")).unwrap();
    assert_eq!(cache.track_state(&k), Some(TrackState::Added));
    assert!(!store.contains(&k.to_bytes()));

    cache.commit();
    backend.commit_to_store();
    assert_eq!(store.try_get(&k.to_bytes()), Some(b"one".to_vec()));
}

#[test]
fn add_over_live_entry_fails() {
    let store = MemoryStore::new();
    let (cache, _backend) = store_cache(&store);

    let k = key(1, b"alpha");
    cache.add(&k, item(b"one")).unwrap();
    assert_eq!(
        cache.add(&k, item(b"two")),
        Err(PersistenceError::AlreadyExists)
    );
}

#[test]
fn delete_of_added_entry_is_forgotten_at_commit() {
    let store = MemoryStore::new();
    let (cache, backend) = store_cache(&store);

    let k = key(1, b"ghost");
    cache.add(&k, item(b"x")).unwrap();
    cache.delete(&k);
    assert_eq!(cache.track_state(&k), Some(TrackState::NotFound));

    cache.commit();
    backend.commit_to_store();
    assert!(!store.contains(&k.to_bytes()));
}

#[test]
fn delete_then_add_yields_changed_with_new_value() {
    let store = MemoryStore::new();
    store.put(&key(1, b"k").to_bytes(), b"old");
    let (cache, backend) = store_cache(&store);

    let k = key(1, b"k");
    cache.delete(&k);
    assert_eq!(cache.track_state(&k), Some(TrackState::Deleted));
    cache.add(&k, item(b"new")).unwrap();
    assert_eq!(cache.track_state(&k), Some(TrackState::Changed));
    assert_eq!(cache.get(&k).unwrap().value(), b"new");

    cache.commit();
    backend.commit_to_store();
    assert_eq!(store.try_get(&k.to_bytes()), Some(b"new".to_vec()));
}

#[test]
fn contains_matches_try_get_at_every_state() {
    let store = MemoryStore::new();
    store.put(&key(1, b"persisted").to_bytes(), b"v");
    let (cache, _backend) = store_cache(&store);

    let persisted = key(1, b"persisted");
    let added = key(1, b"added");
    let missing = key(1, b"missing");

    cache.add(&added, item(b"a")).unwrap();
    for k in [&persisted, &added, &missing] {
        assert_eq!(cache.contains(k), cache.try_get(k).is_some());
    }

    cache.delete(&persisted);
    cache.delete(&added);
    for k in [&persisted, &added] {
        assert_eq!(cache.contains(k), cache.try_get(k).is_some());
        assert!(!cache.contains(k));
    }
}

#[test]
fn commit_propagates_last_write_to_parent() {
    let store = MemoryStore::new();
    store.put(&key(1, b"a").to_bytes(), b"0");
    let (parent, backend) = store_cache(&store);

    let child = Arc::new(parent.clone_cache());
    let k = key(1, b"a");
    child.change(&k, |entry| entry.set_value(b"1".to_vec())).unwrap();
    child.put(&key(1, b"b"), item(b"2"));
    child.delete(&key(1, b"a"));

    child.commit();
    // The parent overlay now holds the child's outcome.
    assert!(!parent.contains(&k));
    assert_eq!(parent.get(&key(1, b"b")).unwrap().value(), b"2");

    parent.commit();
    backend.commit_to_store();
    assert!(!store.contains(&k.to_bytes()));
    assert_eq!(store.try_get(&key(1, b"b").to_bytes()), Some(b"2".to_vec()));
}

#[test]
fn child_reads_through_parent_without_affecting_it() {
    let store = MemoryStore::new();
    store.put(&key(7, b"x").to_bytes(), b"v");
    let (parent, _backend) = store_cache(&store);

    let child = Arc::new(parent.clone_cache());
    assert_eq!(child.get(&key(7, b"x")).unwrap().value(), b"v");
    child.put(&key(7, b"x"), item(b"w"));
    // The write is invisible to the parent until the child commits.
    assert_eq!(parent.get(&key(7, b"x")).unwrap().value(), b"v");
}

#[test]
fn find_merges_layers_and_hides_deletions() {
    let store = MemoryStore::new();
    store.put(&key(1, b"a1").to_bytes(), b"s1");
    store.put(&key(1, b"a2").to_bytes(), b"s2");
    store.put(&key(1, b"a3").to_bytes(), b"s3");
    let (cache, _backend) = store_cache(&store);

    cache.delete(&key(1, b"a2"));
    cache.put(&key(1, b"a4"), item(b"c4"));
    cache.change(&key(1, b"a1"), |entry| entry.set_value(b"c1".to_vec())).unwrap();

    let prefix = StorageKey::new(1).append(b"a").to_bytes();
    let results = cache.find(&prefix, SeekDirection::Forward).unwrap();
    let keys: Vec<Vec<u8>> = results.iter().map(|(k, _)| k.suffix().to_vec()).collect();
    assert_eq!(keys, vec![b"a1".to_vec(), b"a3".to_vec(), b"a4".to_vec()]);
    assert_eq!(results[0].1.value(), b"c1");
}

#[test]
fn backward_find_respects_prefix_boundary() {
    let store = MemoryStore::new();
    store.put(&key(1, &[0x01, 0x01]).to_bytes(), b"a");
    store.put(&key(1, &[0x01, 0xFF]).to_bytes(), b"b");
    store.put(&key(1, &[0x02, 0x00]).to_bytes(), b"c");
    let (cache, _backend) = store_cache(&store);

    let prefix = StorageKey::new(1).append(&[0x01]).to_bytes();
    let results = cache.find(&prefix, SeekDirection::Backward).unwrap();
    let suffixes: Vec<Vec<u8>> = results.iter().map(|(k, _)| k.suffix().to_vec()).collect();
    // Highest key first, nothing outside the prefix.
    assert_eq!(suffixes, vec![vec![0x01, 0xFF], vec![0x01, 0x01]]);
}

#[test]
fn backward_find_rejects_all_ff_prefix() {
    let store = MemoryStore::new();
    let (cache, _backend) = store_cache(&store);
    assert!(cache.find(&[0xFF, 0xFF], SeekDirection::Backward).is_err());
}

#[test]
fn find_range_is_half_open() {
    let store = MemoryStore::new();
    for suffix in [b"a", b"b", b"c", b"d"] {
        store.put(&key(1, suffix).to_bytes(), b"v");
    }
    let (cache, _backend) = store_cache(&store);

    let start = key(1, b"b").to_bytes();
    let end = key(1, b"d").to_bytes();
    let results = cache.find_range(&start, &end, SeekDirection::Forward);
    let suffixes: Vec<Vec<u8>> = results.iter().map(|(k, _)| k.suffix().to_vec()).collect();
    assert_eq!(suffixes, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn states_reset_after_commit() {
    let store = MemoryStore::new();
    let (cache, _backend) = store_cache(&store);

    let k = key(1, b"reset");
    cache.add(&k, item(b"v")).unwrap();
    cache.commit();
    // The change set is gone; the entry reads through from the backend again.
    assert_eq!(cache.track_state(&k), None);
    assert_eq!(cache.get(&k).unwrap().value(), b"v");
    assert_eq!(cache.track_state(&k), Some(TrackState::None));
}

#[test]
fn change_or_add_creates_when_absent_and_marks_changed_when_present() {
    let store = MemoryStore::new();
    store.put(&key(1, b"present").to_bytes(), b"1");
    let (cache, _backend) = store_cache(&store);

    let created = cache.change_or_add(&key(1, b"absent"), item(b""), |entry| {
        entry.set_value(b"fresh".to_vec())
    });
    assert_eq!(created.value(), b"fresh");
    assert_eq!(cache.track_state(&key(1, b"absent")), Some(TrackState::Added));

    cache.change_or_add(&key(1, b"present"), item(b""), |entry| {
        entry.set_value(b"2".to_vec())
    });
    assert_eq!(
        cache.track_state(&key(1, b"present")),
        Some(TrackState::Changed)
    );
}
