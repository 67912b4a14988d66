//! Tests for the two-tier index and the write buffer
//!
//! These tests verify:
//! - Memory tier shadows the disk tier
//! - Conditional promotion and eviction used by flush and GC
//! - Concurrent readers never observe a missing key during updates
//! - Write buffer sealing at capacity

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use zonekv::index::{EvictOutcome, Promotion};
use zonekv::write_buffer::WriteBuffer;
use zonekv::{DiskPointer, Index, IndexValue, ZoneKvError};

// =============================================================================
// Helper Functions
// =============================================================================

fn ptr(lba: u64) -> DiskPointer {
    DiskPointer { lba, len: 64 }
}

// =============================================================================
// Tiers
// =============================================================================

#[test]
fn test_memory_shadows_disk() {
    let index = Index::new(4);
    index.put(b"k", IndexValue::Disk(ptr(4096)));
    index.put(b"k", IndexValue::Memory(Bytes::from("fresh")));

    assert_eq!(index.get(b"k").unwrap(), IndexValue::Memory(Bytes::from("fresh")));
    assert!(index.exists_on_disk(b"k"));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_update_replaces_both_tiers() {
    let index = Index::new(4);
    index.update(b"k", IndexValue::Disk(ptr(0)));

    let previous = index.update(b"k", IndexValue::Memory(Bytes::from("v")));
    assert_eq!(previous, Some(IndexValue::Disk(ptr(0))));
    assert!(!index.exists_on_disk(b"k"));
    assert_eq!(index.disk_len(), 0);
    assert_eq!(index.memory_len(), 1);
}

#[test]
fn test_remove_and_missing() {
    let index = Index::new(4);
    assert!(matches!(index.get(b"nope"), Err(ZoneKvError::NotFound)));
    assert!(!index.delete(b"nope"));

    index.update(b"k", IndexValue::Disk(ptr(8)));
    assert_eq!(index.remove(b"k"), Some(IndexValue::Disk(ptr(8))));
    assert!(index.is_empty());
}

// =============================================================================
// Promotion and Eviction
// =============================================================================

#[test]
fn test_promote_requires_same_value() {
    let index = Index::new(4);
    let flushed = Bytes::from("v1");
    index.update(b"k", IndexValue::Memory(flushed.clone()));

    assert_eq!(
        index.promote(b"k", &flushed, ptr(0)),
        Promotion::Promoted { replaced: None }
    );
    assert_eq!(index.get(b"k").unwrap(), IndexValue::Disk(ptr(0)));

    // A newer write wins over the older record's promotion
    let older = Bytes::from("v2");
    index.update(b"k", IndexValue::Memory(Bytes::from("v3")));
    assert_eq!(index.promote(b"k", &older, ptr(4096)), Promotion::Superseded);
    assert!(index.get(b"k").unwrap().is_memory());
}

#[test]
fn test_promote_after_delete_is_superseded() {
    let index = Index::new(4);
    let flushed = Bytes::from("v");
    index.update(b"k", IndexValue::Memory(flushed.clone()));
    index.delete(b"k");

    assert_eq!(index.promote(b"k", &flushed, ptr(0)), Promotion::Superseded);
    assert!(!index.exists(b"k"));
}

#[test]
fn test_evict_only_matching_lba() {
    let index = Index::new(4);
    index.update(b"a", IndexValue::Disk(ptr(0)));
    index.update(b"b", IndexValue::Disk(ptr(8192)));
    index.update(b"c", IndexValue::Memory(Bytes::from("m")));

    assert_eq!(index.evict_if_at(b"a", 0), EvictOutcome::Evicted);
    assert_eq!(index.evict_if_at(b"b", 0), EvictOutcome::Superseded);
    assert_eq!(index.evict_if_at(b"c", 0), EvictOutcome::Superseded);
    assert_eq!(index.evict_if_at(b"zz", 0), EvictOutcome::Missing);

    assert!(!index.exists(b"a"));
    assert!(index.exists(b"b"));
    assert!(index.exists(b"c"));
}

#[test]
fn test_purge_disk_range() {
    let index = Index::new(8);
    for i in 0..100u64 {
        index.update(format!("k{}", i).as_bytes(), IndexValue::Disk(ptr(i * 4096)));
    }
    let purged = index.purge_disk_range(10 * 4096, 20 * 4096);
    assert_eq!(purged, 10);
    assert_eq!(index.disk_len(), 90);
    assert!(!index.exists(b"k15"));
    assert!(index.exists(b"k20"));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_readers_never_see_gaps_during_updates() {
    let index = Arc::new(Index::new(2));
    index.update(b"hot", IndexValue::Memory(Bytes::from("0")));

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 0..10_000u64 {
                let value = if i % 2 == 0 {
                    IndexValue::Disk(ptr(i * 4096))
                } else {
                    IndexValue::Memory(Bytes::from(i.to_string()))
                };
                index.update(b"hot", value);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    assert!(index.get(b"hot").is_ok());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

// =============================================================================
// Write Buffer
// =============================================================================

#[test]
fn test_write_buffer_seals_at_capacity() {
    let mut buffer = WriteBuffer::new(100);
    buffer.put(Bytes::from("k1"), Bytes::from(vec![0u8; 50])).unwrap();
    assert!(!buffer.is_immutable());

    buffer.put(Bytes::from("k2"), Bytes::from(vec![0u8; 50])).unwrap();
    assert!(buffer.is_immutable());
    assert!(buffer.used_bytes() >= buffer.capacity_bytes());

    let err = buffer.put(Bytes::from("k3"), Bytes::from("v")).unwrap_err();
    assert!(matches!(err, ZoneKvError::BufferSealed));
    assert_eq!(buffer.len(), 2);

    let items = buffer.into_items();
    assert_eq!(items[0].0, Bytes::from("k1"));
    assert_eq!(items[1].0, Bytes::from("k2"));
}
