//! Startup recovery from finished zones

use bytes::Bytes;
use zonekv::{IoBuf, ZoneDevice, ZoneState, PAGE_SIZE};

use crate::common::{key, open_manager, read_back, read_footer, setup_manager, small_config, value};

#[test]
fn test_reopen_restores_index_from_footers() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());
    for i in 0..20 {
        manager.append(key(i), value(i, 3000)).unwrap();
    }
    manager.stop().unwrap();
    drop(manager);

    let reopened = open_manager(config, &device);
    assert_eq!(reopened.index().disk_len(), 20);
    assert_eq!(reopened.full_zone_count(), 1);
    assert_eq!(reopened.empty_zone_count(), 3);
    for i in 0..20 {
        assert_eq!(read_back(&reopened, &key(i)).unwrap(), value(i, 3000));
    }
    assert_eq!(reopened.zones()[0].total_items(), 20);
}

#[test]
fn test_newest_zone_wins_on_replay() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());

    manager.append(Bytes::from("dup"), Bytes::from("old")).unwrap();
    manager.flush().unwrap();
    manager.finish_current_data_zone().unwrap();
    manager.append(Bytes::from("dup"), Bytes::from("new")).unwrap();
    manager.append(key(1), value(1, 10)).unwrap();
    manager.stop().unwrap();
    drop(manager);

    let reopened = open_manager(config, &device);
    assert_eq!(reopened.full_zone_count(), 2);
    assert_eq!(read_back(&reopened, b"dup").unwrap(), Bytes::from("new"));
    // The superseded record counts against its zone
    assert!(reopened.zones()[0].expired_bytes() > 0);
    assert_eq!(reopened.zones()[1].expired_bytes(), 0);
}

#[test]
fn test_sequence_continues_after_reopen() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());
    manager.append(key(0), value(0, 10)).unwrap();
    manager.stop().unwrap();
    drop(manager);

    let reopened = open_manager(config, &device);
    reopened.append(key(1), value(1, 10)).unwrap();
    reopened.stop().unwrap();

    let sequences: Vec<u64> = reopened
        .zones()
        .iter()
        .filter(|zone| zone.state() == ZoneState::Full)
        .map(|zone| zone.sequence())
        .collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn test_unfinished_zone_is_discarded() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());
    manager.append(key(0), value(0, 5000)).unwrap();
    manager.flush().unwrap();
    let zone_offset = manager.data_zone().unwrap().offset();
    // Crash: the open zone never gets its footer
    drop(manager);

    let reopened = open_manager(config, &device);
    assert!(reopened.index().is_empty());
    assert_eq!(reopened.empty_zone_count(), reopened.zones().len());
    assert!(device.snapshot(zone_offset, PAGE_SIZE).iter().all(|&b| b == 0));
}

#[test]
fn test_corrupt_metadata_discards_zone() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());
    manager.append(key(0), value(0, 100)).unwrap();
    manager.flush().unwrap();
    manager.finish_current_data_zone().unwrap();
    manager.append(key(1), value(1, 100)).unwrap();
    manager.stop().unwrap();
    let first = manager.zones()[0].clone();
    drop(manager);

    let footer = read_footer(&device, first.footer_offset()).unwrap();
    let mut page = device.snapshot(footer.metadata_offset, PAGE_SIZE);
    page[0] ^= 0xFF;
    device
        .write(footer.metadata_offset, &IoBuf::from_bytes(&page))
        .unwrap();

    let reopened = open_manager(config, &device);
    assert_eq!(reopened.full_zone_count(), 1);
    assert!(!reopened.index().exists(&key(0)));
    assert_eq!(read_back(&reopened, &key(1)).unwrap(), value(1, 100));
}

#[test]
fn test_fresh_database_wipes_device() {
    let config = small_config();
    let (device, manager) = setup_manager(config.clone());
    manager.append(key(0), value(0, 100)).unwrap();
    manager.stop().unwrap();
    let footer_offset = manager.zones()[0].footer_offset();
    drop(manager);

    let mut fresh = config;
    fresh.use_existing_db = false;
    let reopened = open_manager(fresh, &device);
    assert!(reopened.index().is_empty());
    assert_eq!(reopened.full_zone_count(), 0);
    assert!(read_footer(&device, footer_offset).is_none());
}
