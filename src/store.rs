//! Store Module
//!
//! One store per physical device: an index plus the zone manager writing
//! into it.
//!
//! ## Responsibilities
//! - Open the device and recover the index from finished zones
//! - Serve reads from the memory tier or by decoding the record on disk
//! - Expose put/get/delete/exists/flush and a clean shutdown

use std::sync::Arc;

use bytes::Bytes;

use crate::config::StoreConfig;
use crate::device::{FileDevice, ZoneDevice};
use crate::error::{Result, ZoneKvError};
use crate::index::{Index, IndexValue};
use crate::manager::ZoneManager;
use crate::metrics::{Metrics, MetricsSnapshot};

/// Lookups retried when a disk record is reclaimed under a reader
const MAX_READ_RETRIES: usize = 3;

/// Metrics shards per store (producers, flush worker, GC worker)
const METRICS_SHARDS: usize = 8;

/// Key-value store over one zoned device
///
/// ## Concurrency
/// All methods take `&self`; share it between threads with `Arc<Store>`.
pub struct Store {
    index: Arc<Index>,
    manager: Arc<ZoneManager>,
}

impl Store {
    /// Open (or create) the device at `config.device_path` and start workers
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let device = FileDevice::open(
            &config.device_path,
            config.device_capacity,
            config.zone_capacity,
        )?;
        Self::open_with_device(config, Arc::new(device))
    }

    /// Open over an already constructed device and start workers
    pub fn open_with_device(config: StoreConfig, device: Arc<dyn ZoneDevice>) -> Result<Self> {
        let index = Arc::new(Index::new(config.index_shards));
        let metrics = Arc::new(Metrics::new(METRICS_SHARDS));
        let manager = ZoneManager::open(config, device, Arc::clone(&index), metrics)?;
        manager.start()?;

        tracing::info!(
            keys = index.len(),
            zones = manager.zones().len(),
            "Store opened"
        );
        Ok(Self { index, manager })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Write a value; readable immediately, on disk asynchronously
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        self.manager.append(key.into(), value.into())
    }

    /// Read a value; `NotFound` if the key is absent
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        for _ in 0..MAX_READ_RETRIES {
            let ptr = match self.index.get(key)? {
                IndexValue::Memory(value) => return Ok(value),
                IndexValue::Disk(ptr) => ptr,
            };

            match self.manager.read_single_item(ptr.lba) {
                Ok((read_key, value)) if read_key.as_ref() == key => return Ok(value),
                outcome => {
                    // The zone may have been reclaimed (and reused) meanwhile
                    let moved = self
                        .index
                        .get(key)
                        .map(|current| current.disk_pointer() != Some(ptr))
                        .unwrap_or(true);
                    if moved {
                        continue;
                    }
                    return match outcome {
                        Err(e) => Err(e),
                        Ok(_) => Err(ZoneKvError::Corruption(format!(
                            "record at {} does not hold the requested key",
                            ptr.lba
                        ))),
                    };
                }
            }
        }
        Err(ZoneKvError::NotFound)
    }

    /// Remove a key; returns whether it existed
    ///
    /// Deletes only affect the index: a record of the key that is already
    /// on disk reappears after a restart.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        if self.manager.is_stopping() {
            return Err(ZoneKvError::ShuttingDown);
        }
        match self.index.remove(key) {
            Some(IndexValue::Disk(ptr)) => {
                self.manager.expire(ptr);
                Ok(true)
            }
            Some(IndexValue::Memory(_)) => Ok(true),
            None => Ok(false),
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.index.exists(key)
    }

    /// Block until every accepted write is on the device
    pub fn flush(&self) -> Result<()> {
        self.manager.flush()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.manager.metrics().snapshot()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn manager(&self) -> &Arc<ZoneManager> {
        &self.manager
    }

    /// Stop workers, flush every buffer and finish the open zone
    pub fn close(&self) -> Result<()> {
        self.manager.stop()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Store close failed: {}", e);
        }
    }
}
