//! Shared helpers for zone manager tests

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use zonekv::codec::{ZoneFooter, FOOTER_SIZE};
use zonekv::{Index, IndexValue, IoBuf, MemDevice, Metrics, StoreConfig, ZoneDevice, ZoneManager};

/// 16 MB device split into 4 zones of 4 MB, 32 KB staging buffer
pub fn small_config() -> StoreConfig {
    StoreConfig::builder()
        .device_capacity(16 << 20)
        .zone_capacity(4 << 20)
        .write_buffer_size(1 << 20)
        .writable_buffer_num(1)
        .immutable_buffer_num(4)
        .io_buffer_size(32 << 10)
        .gc_threshold(2)
        .append_timeout(Duration::from_millis(200))
        .worker_poll_interval(Duration::from_millis(5))
        .index_shards(4)
        .build()
}

/// Open a manager (no workers) over a fresh or existing in-memory device
pub fn open_manager(config: StoreConfig, device: &Arc<MemDevice>) -> Arc<ZoneManager> {
    let device: Arc<dyn ZoneDevice> = Arc::clone(device) as Arc<dyn ZoneDevice>;
    ZoneManager::open(
        config.clone(),
        device,
        Arc::new(Index::new(config.index_shards)),
        Arc::new(Metrics::new(4)),
    )
    .unwrap()
}

/// 2 MB device split into 8 zones of 256 KB, for GC and zone switching
pub fn tiny_zone_config() -> StoreConfig {
    let mut config = small_config();
    config.device_capacity = 2 << 20;
    config.zone_capacity = 256 << 10;
    config
}

pub fn setup_manager(config: StoreConfig) -> (Arc<MemDevice>, Arc<ZoneManager>) {
    let device = Arc::new(MemDevice::new(config.device_capacity, config.zone_capacity));
    let manager = open_manager(config, &device);
    (device, manager)
}

pub fn key(i: usize) -> Bytes {
    Bytes::from(format!("key-{:04}", i))
}

/// Value whose bytes depend on `i`, so mixups are detected
pub fn value(i: usize, len: usize) -> Bytes {
    Bytes::from((0..len).map(|j| ((i * 31 + j) % 251) as u8).collect::<Vec<u8>>())
}

/// Read a key through the index, decoding from disk when needed
pub fn read_back(manager: &ZoneManager, key: &[u8]) -> Option<Bytes> {
    match manager.index().get(key).ok()? {
        IndexValue::Memory(value) => Some(value),
        IndexValue::Disk(ptr) => {
            let (read_key, value) = manager.read_single_item(ptr.lba).unwrap();
            assert_eq!(read_key.as_ref(), key);
            Some(value)
        }
    }
}

/// Decode a finished zone's footer straight from the device
pub fn read_footer(device: &MemDevice, footer_offset: u64) -> Option<ZoneFooter> {
    let mut page = IoBuf::with_capacity(FOOTER_SIZE);
    device.read(footer_offset, &mut page).unwrap();
    ZoneFooter::decode(page.as_slice()).ok()
}
