//! Configuration for ZoneKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ZoneKvError};

// =============================================================================
// Layout Constants
// =============================================================================

/// Minimal I/O unit; every device offset and length is a multiple of it
pub const PAGE_SIZE: usize = 4096;

/// Largest key accepted by `put`
pub const MAX_KEY_SIZE: usize = 1024;

/// Largest value accepted by `put`
pub const MAX_VALUE_SIZE: usize = 32 << 20;

/// Size of the staging buffer the flush worker encodes records into
pub const DEFAULT_IO_BUFFER_SIZE: usize = 512 << 10;

/// Round `n` up to the next multiple of `PAGE_SIZE`
pub fn align_to_page(n: u64) -> u64 {
    let page = PAGE_SIZE as u64;
    n.div_ceil(page) * page
}

/// Configuration for one store (one physical device)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// File or block device backing the store
    pub device_path: PathBuf,

    /// Total addressable bytes of the device
    pub device_capacity: u64,

    /// Bytes per zone; must divide `device_capacity`
    pub zone_capacity: u64,

    /// Rebuild state from the device instead of wiping it
    pub use_existing_db: bool,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Capacity of a single writable buffer before it is sealed
    pub write_buffer_size: u64,

    /// Number of independent writable buffer shards
    pub writable_buffer_num: usize,

    /// Max sealed buffers waiting for the flush worker (backpressure cap)
    pub immutable_buffer_num: usize,

    /// Staging buffer size used when encoding records for the device
    pub io_buffer_size: usize,

    /// Upper bound for a producer blocked on a saturated immutable queue
    pub append_timeout: Duration,

    // -------------------------------------------------------------------------
    // Background Worker Configuration
    // -------------------------------------------------------------------------
    /// GC reclaims zones while fewer than this many zones are empty
    pub gc_threshold: usize,

    /// Idle wait of the flush and GC workers between shutdown checks
    pub worker_poll_interval: Duration,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Number of lock shards in the index
    pub index_shards: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("./zonekv.dev"),
            device_capacity: 1 << 30,      // 1 GB
            zone_capacity: 64 << 20,       // 64 MB
            use_existing_db: true,
            write_buffer_size: 8 << 20,    // 8 MB
            writable_buffer_num: 4,
            immutable_buffer_num: 4,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            append_timeout: Duration::from_secs(30),
            gc_threshold: 2,
            worker_poll_interval: Duration::from_millis(50),
            index_shards: 20,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Number of zones the device is split into
    pub fn zone_count(&self) -> u64 {
        self.device_capacity / self.zone_capacity
    }

    /// Check the layout invariants the zone manager relies on
    pub fn validate(&self) -> Result<()> {
        let page = PAGE_SIZE as u64;

        if self.zone_capacity == 0 || self.zone_capacity % page != 0 {
            return Err(ZoneKvError::Config(format!(
                "zone capacity {} is not a positive multiple of {}",
                self.zone_capacity, PAGE_SIZE
            )));
        }
        if self.device_capacity == 0 || self.device_capacity % self.zone_capacity != 0 {
            return Err(ZoneKvError::Config(format!(
                "device capacity {} is not a positive multiple of zone capacity {}",
                self.device_capacity, self.zone_capacity
            )));
        }
        if self.io_buffer_size == 0 || self.io_buffer_size % PAGE_SIZE != 0 {
            return Err(ZoneKvError::Config(format!(
                "io buffer size {} is not a positive multiple of {}",
                self.io_buffer_size, PAGE_SIZE
            )));
        }
        // Room for one staging buffer, one metadata page, the footer and a data page
        let minimum = self.io_buffer_size as u64 + 4 * page;
        if self.zone_capacity < minimum {
            return Err(ZoneKvError::Config(format!(
                "zone capacity {} is too small, need at least {}",
                self.zone_capacity, minimum
            )));
        }
        if self.zone_count() < 2 {
            return Err(ZoneKvError::Config(
                "device must contain at least two zones".to_string(),
            ));
        }
        if self.write_buffer_size == 0 {
            return Err(ZoneKvError::Config("write buffer size must be positive".to_string()));
        }
        if self.writable_buffer_num == 0 || self.immutable_buffer_num == 0 {
            return Err(ZoneKvError::Config(
                "writable and immutable buffer counts must be positive".to_string(),
            ));
        }
        if self.gc_threshold == 0 {
            return Err(ZoneKvError::Config("gc threshold must be at least one zone".to_string()));
        }
        if self.index_shards == 0 {
            return Err(ZoneKvError::Config("index shard count must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the device path (regular file or block device)
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.device_path = path.into();
        self
    }

    /// Set the device capacity (in bytes)
    pub fn device_capacity(mut self, bytes: u64) -> Self {
        self.config.device_capacity = bytes;
        self
    }

    /// Set the zone capacity (in bytes)
    pub fn zone_capacity(mut self, bytes: u64) -> Self {
        self.config.zone_capacity = bytes;
        self
    }

    /// Recover from existing device contents instead of wiping them
    pub fn use_existing_db(mut self, recover: bool) -> Self {
        self.config.use_existing_db = recover;
        self
    }

    /// Set the capacity of each writable buffer (in bytes)
    pub fn write_buffer_size(mut self, bytes: u64) -> Self {
        self.config.write_buffer_size = bytes;
        self
    }

    /// Set the number of writable buffer shards
    pub fn writable_buffer_num(mut self, count: usize) -> Self {
        self.config.writable_buffer_num = count;
        self
    }

    /// Set the immutable buffer queue capacity
    pub fn immutable_buffer_num(mut self, count: usize) -> Self {
        self.config.immutable_buffer_num = count;
        self
    }

    /// Set the flush staging buffer size (in bytes)
    pub fn io_buffer_size(mut self, bytes: usize) -> Self {
        self.config.io_buffer_size = bytes;
        self
    }

    /// Set the backpressure wait bound
    pub fn append_timeout(mut self, timeout: Duration) -> Self {
        self.config.append_timeout = timeout;
        self
    }

    /// Set the empty zone low-water mark that triggers GC
    pub fn gc_threshold(mut self, zones: usize) -> Self {
        self.config.gc_threshold = zones;
        self
    }

    /// Set the background worker idle wait
    pub fn worker_poll_interval(mut self, interval: Duration) -> Self {
        self.config.worker_poll_interval = interval;
        self
    }

    /// Set the number of index lock shards
    pub fn index_shards(mut self, shards: usize) -> Self {
        self.config.index_shards = shards;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

/// Configuration for a multi-device database
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    /// One entry per device; keys are sharded across them by hash
    pub stores: Vec<StoreConfig>,
}

impl DbConfig {
    pub fn builder() -> DbConfigBuilder {
        DbConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.stores.is_empty() {
            return Err(ZoneKvError::Config("at least one store is required".to_string()));
        }
        for store in &self.stores {
            store.validate()?;
        }
        Ok(())
    }
}

/// Builder for DbConfig
#[derive(Default)]
pub struct DbConfigBuilder {
    config: DbConfig,
}

impl DbConfigBuilder {
    /// Add a device
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.stores.push(store);
        self
    }

    pub fn build(self) -> DbConfig {
        self.config
    }
}
