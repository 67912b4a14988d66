//! Tests for Store and Db
//!
//! These tests verify:
//! - put/get/delete/exists through the background workers
//! - Reads served from disk after a flush
//! - Persistence across close and reopen of a device file
//! - Continuous writes on a small device kept alive by GC
//! - Key routing across several stores

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use zonekv::{Db, DbConfig, Store, StoreConfig, ZoneKvError};

// =============================================================================
// Helper Functions
// =============================================================================

fn store_config(path: PathBuf) -> StoreConfig {
    StoreConfig::builder()
        .device_path(path)
        .device_capacity(16 << 20)
        .zone_capacity(2 << 20)
        .write_buffer_size(64 << 10)
        .writable_buffer_num(2)
        .immutable_buffer_num(4)
        .io_buffer_size(64 << 10)
        .append_timeout(Duration::from_secs(5))
        .worker_poll_interval(Duration::from_millis(5))
        .build()
}

fn setup_temp_store() -> (TempDir, StoreConfig, Store) {
    let temp_dir = TempDir::new().unwrap();
    let config = store_config(temp_dir.path().join("store.dev"));
    let store = Store::open(config.clone()).unwrap();
    (temp_dir, config, store)
}

fn value(i: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| ((i + j) % 256) as u8).collect()
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_get() {
    let (_dir, _config, store) = setup_temp_store();
    store.put("name", "zonekv").unwrap();
    assert_eq!(store.get(b"name").unwrap(), Bytes::from("zonekv"));
    assert!(store.exists(b"name"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_get_missing() {
    let (_dir, _config, store) = setup_temp_store();
    assert!(matches!(store.get(b"missing"), Err(ZoneKvError::NotFound)));
    assert!(!store.exists(b"missing"));
    assert!(store.is_empty());
}

#[test]
fn test_overwrite_returns_latest() {
    let (_dir, _config, store) = setup_temp_store();
    store.put("k", "v1").unwrap();
    store.flush().unwrap();
    store.put("k", "v2").unwrap();
    assert_eq!(store.get(b"k").unwrap(), Bytes::from("v2"));

    store.flush().unwrap();
    assert_eq!(store.get(b"k").unwrap(), Bytes::from("v2"));
}

#[test]
fn test_delete() {
    let (_dir, _config, store) = setup_temp_store();
    store.put("mem", "1").unwrap();
    store.put("disk", "2").unwrap();
    store.flush().unwrap();
    store.put("mem", "3").unwrap();

    assert!(store.delete(b"mem").unwrap());
    assert!(store.delete(b"disk").unwrap());
    assert!(!store.delete(b"never").unwrap());
    assert!(store.get(b"mem").unwrap_err().is_not_found());
    assert!(store.get(b"disk").unwrap_err().is_not_found());

    // A delete racing the flush of its key is not undone by the promotion
    store.flush().unwrap();
    assert!(!store.exists(b"mem"));
}

#[test]
fn test_reads_from_disk_after_flush() {
    let (_dir, _config, store) = setup_temp_store();
    for i in 0..200 {
        store.put(format!("key-{}", i), value(i, 1500)).unwrap();
    }
    store.flush().unwrap();

    assert_eq!(store.manager().index().memory_len(), 0);
    for i in 0..200 {
        assert_eq!(store.get(format!("key-{}", i).as_bytes()).unwrap(), value(i, 1500));
    }
    assert!(store.metrics().disk_reads >= 200);
}

#[test]
fn test_rejects_invalid_keys() {
    let (_dir, _config, store) = setup_temp_store();
    assert!(matches!(store.put("", "v"), Err(ZoneKvError::InvalidArgument(_))));
}

#[test]
fn test_operations_after_close() {
    let (_dir, _config, store) = setup_temp_store();
    store.put("k", "v").unwrap();
    store.close().unwrap();

    assert!(matches!(store.put("k2", "v"), Err(ZoneKvError::ShuttingDown)));
    assert!(matches!(store.delete(b"k"), Err(ZoneKvError::ShuttingDown)));
    // Reads keep working on a closed store
    assert_eq!(store.get(b"k").unwrap(), Bytes::from("v"));
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_reopen_recovers_data() {
    let (dir, config, store) = setup_temp_store();
    for i in 0..100 {
        store.put(format!("key-{}", i), value(i, 2000)).unwrap();
    }
    store.close().unwrap();
    drop(store);

    let reopened = Store::open(config).unwrap();
    assert_eq!(reopened.len(), 100);
    for i in 0..100 {
        assert_eq!(reopened.get(format!("key-{}", i).as_bytes()).unwrap(), value(i, 2000));
    }
    drop(dir);
}

#[test]
fn test_reopen_fresh_discards_data() {
    let (_dir, config, store) = setup_temp_store();
    store.put("k", "v").unwrap();
    drop(store);

    let mut fresh = config;
    fresh.use_existing_db = false;
    let reopened = Store::open(fresh).unwrap();
    assert!(reopened.is_empty());
}

#[test]
fn test_geometry_mismatch_rejected() {
    let (dir, config, store) = setup_temp_store();
    drop(store);

    let mut other = config;
    other.zone_capacity = 3 << 20;
    assert!(matches!(Store::open(other), Err(ZoneKvError::Config(_))));
    drop(dir);
}

// =============================================================================
// GC Under Load
// =============================================================================

#[test]
fn test_sustained_writes_reclaim_zones() {
    let (_dir, _config, store) = setup_temp_store();

    // 48 MB through a 16 MB device
    let total = 6000;
    for i in 0..total {
        store.put(format!("key-{}", i), value(i, 8 << 10)).unwrap();
    }
    store.flush().unwrap();

    let snapshot = store.metrics();
    assert!(snapshot.zones_reclaimed > 0);
    assert!(snapshot.keys_evicted > 0);

    // The newest writes survive; evicted ones read as missing, never wrong
    for i in (total - 100)..total {
        assert_eq!(store.get(format!("key-{}", i).as_bytes()).unwrap(), value(i, 8 << 10));
    }
    for i in 0..total {
        match store.get(format!("key-{}", i).as_bytes()) {
            Ok(v) => assert_eq!(v, value(i, 8 << 10)),
            Err(e) => assert!(e.is_not_found()),
        }
    }
}

// =============================================================================
// Db
// =============================================================================

#[test]
fn test_db_routes_keys_across_stores() {
    let temp_dir = TempDir::new().unwrap();
    let config = DbConfig::builder()
        .store(store_config(temp_dir.path().join("a.dev")))
        .store(store_config(temp_dir.path().join("b.dev")))
        .build();
    let db = Db::open(config.clone()).unwrap();

    for i in 0..200 {
        db.put(format!("key-{}", i), value(i, 100)).unwrap();
    }
    assert_eq!(db.stores().len(), 2);
    assert!(db.stores().iter().all(|store| !store.is_empty()));
    assert_eq!(db.stores().iter().map(|store| store.len()).sum::<usize>(), 200);

    db.flush().unwrap();
    for i in 0..200 {
        assert_eq!(db.get(format!("key-{}", i).as_bytes()).unwrap(), value(i, 100));
    }
    assert!(db.delete(b"key-0").unwrap());
    assert!(!db.exists(b"key-0"));
    assert_eq!(db.metrics().appends, 200);

    db.close().unwrap();
    drop(db);

    let reopened = Db::open(config).unwrap();
    // Deletes are not persisted
    assert!(reopened.exists(b"key-0"));
    assert_eq!(reopened.get(b"key-199").unwrap(), value(199, 100));
}

#[test]
fn test_db_requires_a_store() {
    let config = DbConfig::builder().build();
    assert!(matches!(Db::open(config), Err(ZoneKvError::Config(_))));
}
