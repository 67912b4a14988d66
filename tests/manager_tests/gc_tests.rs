//! Garbage collection of FULL zones

use std::sync::Arc;

use bytes::Bytes;
use zonekv::{IoBuf, MemDevice, ZoneDevice, ZoneManager, ZoneState, PAGE_SIZE};

use crate::common::{read_back, setup_manager, tiny_zone_config, value};

fn zone_key(zone: usize, i: usize) -> Bytes {
    Bytes::from(format!("z{}-k{}", zone, i))
}

/// Finish `zones` zones of three 10 KB records each
fn fill_zones(manager: &ZoneManager, zones: usize) {
    for z in 0..zones {
        for i in 0..3 {
            manager.append(zone_key(z, i), value(z * 3 + i, 10 << 10)).unwrap();
        }
        manager.flush().unwrap();
        manager.finish_current_data_zone().unwrap();
    }
}

/// 8 zones, 7 FULL: one empty zone left, below the threshold of 2
fn setup_nearly_full() -> (Arc<MemDevice>, Arc<ZoneManager>) {
    let (device, manager) = setup_manager(tiny_zone_config());
    fill_zones(&manager, 7);
    assert_eq!(manager.full_zone_count(), 7);
    assert_eq!(manager.empty_zone_count(), 1);
    (device, manager)
}

// =============================================================================
// Triggering
// =============================================================================

#[test]
fn test_gc_noop_above_threshold() {
    let (_device, manager) = setup_manager(tiny_zone_config());
    fill_zones(&manager, 2);
    assert!(!manager.gc().unwrap());
    assert_eq!(manager.full_zone_count(), 2);
}

#[test]
fn test_gc_without_full_zones() {
    let mut config = tiny_zone_config();
    config.gc_threshold = 100;
    let (_device, manager) = setup_manager(config);
    assert!(!manager.gc().unwrap());
}

// =============================================================================
// Reclaim
// =============================================================================

#[test]
fn test_gc_reclaims_oldest_zone_and_evicts_keys() {
    let (_device, manager) = setup_nearly_full();

    // Rewriting a key of zone 0 expires its old record there
    manager.append(zone_key(0, 0), Bytes::from("fresh")).unwrap();
    assert!(manager.zones()[0].expired_bytes() > 0);

    assert!(manager.gc().unwrap());
    let reclaimed = &manager.zones()[0];
    assert_eq!(reclaimed.state(), ZoneState::Empty);
    assert_eq!(reclaimed.write_pointer(), reclaimed.offset());
    assert_eq!(reclaimed.expired_bytes(), 0);
    assert_eq!(manager.empty_zone_count(), 2);
    assert_eq!(manager.full_zone_count(), 6);

    assert!(manager.index().get(&zone_key(0, 1)).unwrap_err().is_not_found());
    assert!(manager.index().get(&zone_key(0, 2)).unwrap_err().is_not_found());
    assert_eq!(read_back(&manager, &zone_key(0, 0)).unwrap(), Bytes::from("fresh"));
    // Other zones untouched
    assert_eq!(read_back(&manager, &zone_key(1, 0)).unwrap(), value(3, 10 << 10));

    let snapshot = manager.metrics().snapshot();
    assert_eq!(snapshot.zones_reclaimed, 1);
    assert_eq!(snapshot.keys_evicted, 2);
    assert_eq!(snapshot.keys_skipped, 1);

    // Back at the threshold
    assert!(!manager.gc().unwrap());
}

#[test]
fn test_gc_prefers_zone_with_expired_bytes() {
    let (_device, manager) = setup_nearly_full();

    // Invalidate every record of zone 5
    for i in 0..3 {
        manager.append(zone_key(5, i), Bytes::from("new")).unwrap();
    }

    assert!(manager.gc().unwrap());
    assert_eq!(manager.zones()[5].state(), ZoneState::Empty);
    assert_eq!(manager.zones()[0].state(), ZoneState::Full);
    for i in 0..3 {
        assert_eq!(read_back(&manager, &zone_key(5, i)).unwrap(), Bytes::from("new"));
    }
}

#[test]
fn test_gc_purges_zone_with_unreadable_footer() {
    let (device, manager) = setup_nearly_full();
    manager.append(zone_key(0, 0), Bytes::from("fresh")).unwrap();

    let zone = Arc::clone(&manager.zones()[0]);
    device
        .write(zone.footer_offset(), &IoBuf::from_bytes(&[0u8; PAGE_SIZE]))
        .unwrap();

    assert!(manager.gc().unwrap());
    assert_eq!(zone.state(), ZoneState::Empty);
    assert!(!manager.index().exists(&zone_key(0, 1)));
    assert!(!manager.index().exists(&zone_key(0, 2)));
    // Memory entries are not touched by the purge
    assert_eq!(read_back(&manager, &zone_key(0, 0)).unwrap(), Bytes::from("fresh"));
    assert_eq!(manager.metrics().snapshot().keys_evicted, 2);
}

#[test]
fn test_exhausted_pool_runs_gc_inline() {
    let (_device, manager) = setup_manager(tiny_zone_config());
    fill_zones(&manager, 8);
    assert_eq!(manager.empty_zone_count(), 0);

    // No GC worker: opening the next zone reclaims one on the caller
    manager.append(Bytes::from("late"), value(99, 1000)).unwrap();
    manager.flush().unwrap();

    let snapshot = manager.metrics().snapshot();
    assert!(snapshot.zones_reclaimed >= 1);
    assert!(snapshot.zone_switch_stalls >= 1);
    assert_eq!(read_back(&manager, b"late").unwrap(), value(99, 1000));
}

#[test]
fn test_reclaimed_zone_is_reused() {
    let (_device, manager) = setup_nearly_full();
    assert!(manager.gc().unwrap());

    // Empty pool order: zone 7 first, then the reclaimed zone 0
    fill_zones(&manager, 1);
    manager.append(Bytes::from("reuse"), value(42, 2000)).unwrap();
    manager.flush().unwrap();

    let ptr = manager.index().get(b"reuse").unwrap().disk_pointer().unwrap();
    assert!(manager.zones()[0].contains(ptr.lba));
    assert_eq!(read_back(&manager, b"reuse").unwrap(), value(42, 2000));
}
