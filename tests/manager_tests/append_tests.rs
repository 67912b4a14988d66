//! Append path: write buffers, sealing, backpressure

use std::time::Duration;

use bytes::Bytes;
use zonekv::{IndexValue, MAX_KEY_SIZE};

use crate::common::{key, read_back, setup_manager, small_config, value};

// =============================================================================
// Buffer Sealing
// =============================================================================

#[test]
fn test_sealed_buffer_is_queued_and_flushed() {
    let (_device, manager) = setup_manager(small_config());

    // 1 MB buffer: the 11th 100 KB value seals it
    for i in 0..15 {
        manager.append(key(i), value(i, 100 << 10)).unwrap();
    }
    assert_eq!(manager.immutable_buffer_num(), 1);
    assert_eq!(manager.writable_buffer_num(), 1);

    assert!(manager.try_flush().unwrap());
    assert_eq!(manager.immutable_buffer_num(), 0);
    assert_eq!(manager.index().disk_len(), 11);
    assert_eq!(manager.index().memory_len(), 4);

    for i in 0..15 {
        assert_eq!(read_back(&manager, &key(i)).unwrap(), value(i, 100 << 10));
    }
}

#[test]
fn test_try_flush_without_sealed_buffer() {
    let (_device, manager) = setup_manager(small_config());
    manager.append(key(0), value(0, 128)).unwrap();

    assert!(!manager.try_flush().unwrap());
    // The data zone is opened even when there is nothing to flush
    assert!(manager.data_zone().is_some());
    assert!(manager.index().get(&key(0)).unwrap().is_memory());
}

#[test]
fn test_append_visible_before_flush() {
    let (_device, manager) = setup_manager(small_config());
    manager.append(key(1), Bytes::from("hello")).unwrap();

    match manager.index().get(&key(1)).unwrap() {
        IndexValue::Memory(v) => assert_eq!(v, Bytes::from("hello")),
        other => panic!("expected memory entry, got {:?}", other),
    }
}

#[test]
fn test_overwrite_expires_disk_record() {
    let (_device, manager) = setup_manager(small_config());
    manager.append(key(0), value(0, 4096)).unwrap();
    manager.flush().unwrap();

    let ptr = manager.index().get(&key(0)).unwrap().disk_pointer().unwrap();
    let zone = manager.zones()[0].clone();
    assert_eq!(zone.expired_bytes(), 0);

    manager.append(key(0), value(1, 16)).unwrap();
    assert_eq!(zone.expired_bytes(), ptr.len as u64);
    assert_eq!(zone.expired_items(), 1);
    assert_eq!(read_back(&manager, &key(0)).unwrap(), value(1, 16));
}

// =============================================================================
// Argument Checks
// =============================================================================

#[test]
fn test_rejects_bad_items() {
    let (_device, manager) = setup_manager(small_config());

    let empty = manager.append(Bytes::new(), Bytes::from("v")).unwrap_err();
    assert!(matches!(empty, zonekv::ZoneKvError::InvalidArgument(_)));

    let long_key = Bytes::from(vec![b'k'; MAX_KEY_SIZE + 1]);
    let err = manager.append(long_key, Bytes::from("v")).unwrap_err();
    assert!(matches!(err, zonekv::ZoneKvError::InvalidArgument(_)));

    // Larger than an empty 4 MB zone can hold
    let huge = Bytes::from(vec![0u8; 4 << 20]);
    let err = manager.append(key(0), huge).unwrap_err();
    assert!(matches!(err, zonekv::ZoneKvError::InvalidArgument(_)));

    assert!(manager.index().is_empty());
}

#[test]
fn test_max_key_accepted() {
    let (_device, manager) = setup_manager(small_config());
    let long_key = Bytes::from(vec![b'k'; MAX_KEY_SIZE]);
    manager.append(long_key.clone(), Bytes::from("v")).unwrap();
    manager.flush().unwrap();
    assert_eq!(read_back(&manager, &long_key).unwrap(), Bytes::from("v"));
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_full_queue_rejects_next_write_with_busy() {
    let mut config = small_config();
    config.write_buffer_size = 4096;
    config.immutable_buffer_num = 1;
    config.append_timeout = Duration::from_millis(50);
    let (_device, manager) = setup_manager(config);

    manager.append(key(1), value(1, 3000)).unwrap();
    // Seals the first buffer, which fills the queue
    manager.append(key(2), value(2, 3000)).unwrap();
    assert_eq!(manager.immutable_buffer_num(), 1);

    manager.append(key(3), value(3, 3000)).unwrap();
    // Seals the second buffer; the queue is full, but the write is accepted
    manager.append(key(4), value(4, 3000)).unwrap();
    assert!(manager.metrics().snapshot().backpressure_waits >= 1);
    assert_eq!(read_back(&manager, &key(4)).unwrap(), value(4, 3000));

    // The shard still holds the sealed buffer, so the next write is rejected
    let err = manager.append(key(5), value(5, 3000)).unwrap_err();
    assert!(err.is_busy());
    assert!(read_back(&manager, &key(5)).is_none());

    assert!(manager.try_flush().unwrap());
    manager.append(key(5), value(5, 3000)).unwrap();
    assert_eq!(manager.immutable_buffer_num(), 1);

    manager.flush().unwrap();
    for i in 1..=5 {
        assert!(manager.index().exists_on_disk(&key(i)), "key {} not on disk", i);
        assert_eq!(read_back(&manager, &key(i)).unwrap(), value(i, 3000));
    }
}

#[test]
fn test_append_after_stop_fails() {
    let (_device, manager) = setup_manager(small_config());
    manager.append(key(0), value(0, 10)).unwrap();
    manager.stop().unwrap();

    let err = manager.append(key(1), value(1, 10)).unwrap_err();
    assert!(matches!(err, zonekv::ZoneKvError::ShuttingDown));
    assert!(manager.is_stopping());
}
