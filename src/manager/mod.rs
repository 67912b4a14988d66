//! Zone Manager Module
//!
//! Multiplexes concurrent writers onto a single open zone.
//!
//! ## Responsibilities
//! - Route appends to sharded write buffers and seal them when full
//! - Queue sealed buffers for the flush worker (bounded: backpressure)
//! - Encode records into page-aligned I/O buffers and append them to the
//!   open data zone, then confirm them in the index
//! - Finish zones (metadata + footer) and switch to empty ones
//! - Reclaim FULL zones in the GC worker
//! - Rebuild zone states and the index from footers on open
//!
//! ## Threads
//! ```text
//!  producers ──append──► [writable shards] ──seal──► [immutable queue]
//!                                                         │
//!                                      flush worker ◄─────┘
//!                                           │ encode + append
//!                                           ▼
//!                                   [open data zone] ──finish──► FULL
//!                                           ▲                      │
//!                           [empty pool] ◄──┴──── GC worker ◄──────┘
//! ```
//!
//! ## Lock order
//! `flush_state` → writable shard → `empty_zones`. Producers only take their
//! shard lock; they never touch `flush_state`.

mod flush;
mod lifecycle;
mod read;
mod reclaim;
mod recovery;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::codec::{encoded_record_len, meta_entry_len};
use crate::config::{align_to_page, StoreConfig, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};
use crate::device::ZoneDevice;
use crate::error::{Result, ZoneKvError};
use crate::hash::{shard_for, LAYER_WRITE_BUFFER};
use crate::index::{DiskPointer, Index, IndexValue};
use crate::metrics::{Counter, Metrics};
use crate::write_buffer::WriteBuffer;
use crate::zone::{Zone, ZoneState};

use flush::FlushState;

/// Sealed-buffer retries inside a single append
const MAX_SEAL_RETRIES: usize = 3;

/// Owns the zones of one device and the write pipeline feeding them
pub struct ZoneManager {
    config: StoreConfig,
    device: Arc<dyn ZoneDevice>,
    index: Arc<Index>,
    metrics: Arc<Metrics>,

    /// All zones, indexed by id
    zones: Vec<Arc<Zone>>,

    // -------------------------------------------------------------------------
    // Write pipeline
    // -------------------------------------------------------------------------
    writable: Vec<Mutex<WriteBuffer>>,
    immutable_tx: Sender<WriteBuffer>,
    immutable_rx: Receiver<WriteBuffer>,

    /// Open zone and staging buffer; held by whoever is flushing
    flush_state: Mutex<FlushState>,

    // -------------------------------------------------------------------------
    // Zone pools
    // -------------------------------------------------------------------------
    empty_zones: Mutex<VecDeque<u64>>,
    empty_zone_cv: Condvar,

    /// Close order of finished zones, persisted in footers
    next_sequence: AtomicU64,

    // -------------------------------------------------------------------------
    // GC coordination
    // -------------------------------------------------------------------------
    gc_lock: Mutex<()>,
    gc_requested: Mutex<bool>,
    gc_cv: Condvar,
    gc_active: AtomicBool,

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------
    stop: AtomicBool,
    gc_stop: AtomicBool,
    stopped: AtomicBool,
    /// Shutdown drain failure of the flush worker, reported by `stop`
    drain_error: Mutex<Option<ZoneKvError>>,
    flush_worker: Mutex<Option<JoinHandle<()>>>,
    gc_worker: Mutex<Option<JoinHandle<()>>>,
}

impl ZoneManager {
    /// Build the manager over `device` and restore zone states
    ///
    /// Background workers are not running until `start` is called; until
    /// then `try_flush` and `gc` can be driven by hand.
    pub fn open(
        config: StoreConfig,
        device: Arc<dyn ZoneDevice>,
        index: Arc<Index>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if device.zone_capacity() != config.zone_capacity
            || device.capacity() < config.device_capacity
        {
            return Err(ZoneKvError::Config(format!(
                "device geometry {}B / {}B zones does not match config {}B / {}B zones",
                device.capacity(),
                device.zone_capacity(),
                config.device_capacity,
                config.zone_capacity
            )));
        }

        let zones: Vec<Arc<Zone>> = device
            .zones()
            .into_iter()
            .take(config.zone_count() as usize)
            .map(Arc::new)
            .collect();

        let writable = (0..config.writable_buffer_num)
            .map(|_| Mutex::new(WriteBuffer::new(config.write_buffer_size)))
            .collect();
        let (immutable_tx, immutable_rx) = channel::bounded(config.immutable_buffer_num);
        let flush_state = Mutex::new(FlushState::new(config.io_buffer_size));

        let manager = Self {
            config,
            device,
            index,
            metrics,
            zones,
            writable,
            immutable_tx,
            immutable_rx,
            flush_state,
            empty_zones: Mutex::new(VecDeque::new()),
            empty_zone_cv: Condvar::new(),
            next_sequence: AtomicU64::new(1),
            gc_lock: Mutex::new(()),
            gc_requested: Mutex::new(false),
            gc_cv: Condvar::new(),
            gc_active: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            gc_stop: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            drain_error: Mutex::new(None),
            flush_worker: Mutex::new(None),
            gc_worker: Mutex::new(None),
        };

        manager.recover_zone_states()?;
        Ok(Arc::new(manager))
    }

    /// Spawn the flush and GC workers
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut flush_worker = self.flush_worker.lock();
        if flush_worker.is_some() {
            return Ok(());
        }

        self.gc_active.store(true, Ordering::Release);
        let gc = Arc::clone(self);
        let gc_handle = thread::Builder::new()
            .name("zonekv-gc".to_string())
            .spawn(move || gc.gc_worker_loop())?;
        *self.gc_worker.lock() = Some(gc_handle);

        let flusher = Arc::clone(self);
        let flush_handle = thread::Builder::new()
            .name("zonekv-flush".to_string())
            .spawn(move || flusher.flush_worker_loop())?;
        *flush_worker = Some(flush_handle);

        tracing::info!(
            zones = self.zones.len(),
            empty = self.empty_zone_count(),
            "Zone manager started"
        );
        Ok(())
    }

    /// Stop accepting writes, drain every buffer to disk, finish the open zone
    ///
    /// Idempotent. Without running workers the drain happens on the caller.
    /// Fails if any accepted write could not be flushed.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop.store(true, Ordering::Release);

        let mut result = Ok(());
        match self.flush_worker.lock().take() {
            Some(handle) => {
                if handle.join().is_err() {
                    result = Err(ZoneKvError::Status("flush worker panicked".to_string()));
                } else if let Some(e) = self.drain_error.lock().take() {
                    result = Err(e);
                }
            }
            None => result = self.drain_and_finish(),
        }

        self.gc_stop.store(true, Ordering::Release);
        self.wake_gc();
        if let Some(handle) = self.gc_worker.lock().take() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(ZoneKvError::Status("gc worker panicked".to_string()));
            }
        }
        self.gc_active.store(false, Ordering::Release);

        tracing::info!(metrics = ?self.metrics.snapshot(), "Zone manager stopped");
        result
    }

    // =========================================================================
    // Append Path
    // =========================================================================

    /// Buffer a write and make it visible to readers immediately
    ///
    /// The record reaches the device asynchronously. `Ok` means the write is
    /// held in the pipeline and will be flushed, by `stop` at the latest.
    /// `Busy` and `ShuttingDown` mean it was rejected: `Busy` when the shard
    /// still holds a sealed buffer the immutable queue would not take within
    /// `append_timeout`.
    pub fn append(&self, key: Bytes, value: Bytes) -> Result<()> {
        self.check_item(&key, &value)?;

        let shard = &self.writable[shard_for(&key, LAYER_WRITE_BUFFER, self.writable.len())];
        let item_bytes = (key.len() + value.len()) as u64;

        for _ in 0..MAX_SEAL_RETRIES {
            let mut buffer = shard.lock();
            // `stop` is set before any drain starts, so a put that sees it
            // clear here lands before the drain reaches this shard
            if self.stop.load(Ordering::Acquire) {
                return Err(ZoneKvError::ShuttingDown);
            }
            if buffer.is_immutable() {
                // A previous enqueue timed out and left its sealed buffer here
                self.seal_and_enqueue(&mut buffer)?;
            }

            match buffer.put(key.clone(), value.clone()) {
                Ok(()) => {
                    if let Some(IndexValue::Disk(old)) =
                        self.index.update(&key, IndexValue::Memory(value.clone()))
                    {
                        self.expire(old);
                    }
                    self.metrics.incr(Counter::Appends);
                    self.metrics.add(Counter::BytesAppended, item_bytes);

                    if buffer.is_immutable() {
                        if let Err(e) = self.seal_and_enqueue(&mut buffer) {
                            // The sealed buffer stays in the shard; the next
                            // append or the shutdown drain queues it
                            tracing::warn!("Write accepted, sealed buffer left in shard: {}", e);
                        }
                    }
                    return Ok(());
                }
                Err(ZoneKvError::BufferSealed) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ZoneKvError::Status(format!(
            "write buffer stayed sealed after {} attempts",
            MAX_SEAL_RETRIES
        )))
    }

    /// Move the shard's sealed buffer to the immutable queue and replace it
    ///
    /// Called with the shard lock held. Blocks while the queue is full, up to
    /// `append_timeout`; on failure the sealed buffer is put back.
    fn seal_and_enqueue(&self, buffer: &mut WriteBuffer) -> Result<()> {
        buffer.mark_immutable();
        let fresh = WriteBuffer::new(self.config.write_buffer_size);
        let mut sealed = std::mem::replace(buffer, fresh);

        let deadline = Instant::now() + self.config.append_timeout;
        let mut waited = false;
        loop {
            match self
                .immutable_tx
                .send_timeout(sealed, self.config.worker_poll_interval)
            {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !waited {
                        waited = true;
                        self.metrics.incr(Counter::BackpressureWaits);
                        tracing::debug!(
                            queued = self.immutable_rx.len(),
                            "Immutable queue full, producer waiting"
                        );
                    }
                    if self.stop.load(Ordering::Acquire) {
                        *buffer = returned;
                        return Err(ZoneKvError::ShuttingDown);
                    }
                    if Instant::now() >= deadline {
                        *buffer = returned;
                        tracing::warn!(
                            timeout_ms = self.config.append_timeout.as_millis() as u64,
                            "Immutable queue saturated"
                        );
                        return Err(ZoneKvError::Busy(format!(
                            "immutable queue full for {:?}",
                            self.config.append_timeout
                        )));
                    }
                    sealed = returned;
                }
                Err(SendTimeoutError::Disconnected(returned)) => {
                    *buffer = returned;
                    return Err(ZoneKvError::ShuttingDown);
                }
            }
        }
    }

    /// Size limits, and the record must fit an empty zone with its metadata
    fn check_item(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_SIZE {
            return Err(ZoneKvError::InvalidArgument(format!(
                "key size {} outside 1..={}",
                key.len(),
                MAX_KEY_SIZE
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(ZoneKvError::InvalidArgument(format!(
                "value size {} exceeds {}",
                value.len(),
                MAX_VALUE_SIZE
            )));
        }
        let needed = self.worst_case_item(value.len())
            + align_to_page(meta_entry_len(MAX_KEY_SIZE))
            + PAGE_SIZE as u64;
        if needed > self.config.zone_capacity {
            return Err(ZoneKvError::InvalidArgument(format!(
                "value of {} bytes cannot fit a {} byte zone",
                value.len(),
                self.config.zone_capacity
            )));
        }
        Ok(())
    }

    /// Encoded size of a record with the largest key, plus alignment slack
    fn worst_case_item(&self, value_len: usize) -> u64 {
        encoded_record_len(MAX_KEY_SIZE, value_len) + PAGE_SIZE as u64
    }

    // =========================================================================
    // Expired-bytes Accounting
    // =========================================================================

    fn zone_of(&self, lba: u64) -> Option<&Arc<Zone>> {
        self.zones.get((lba / self.config.zone_capacity) as usize)
    }

    /// Charge a no longer referenced record to its zone
    pub(crate) fn expire(&self, ptr: DiskPointer) {
        if let Some(zone) = self.zone_of(ptr.lba) {
            zone.record_expired(ptr.len as u64);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn device(&self) -> &Arc<dyn ZoneDevice> {
        &self.device
    }

    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// Number of writable buffer shards (always one live buffer each)
    pub fn writable_buffer_num(&self) -> usize {
        self.writable.len()
    }

    /// Sealed buffers waiting for the flush worker
    pub fn immutable_buffer_num(&self) -> usize {
        self.immutable_rx.len()
    }

    pub fn empty_zone_count(&self) -> usize {
        self.empty_zones.lock().len()
    }

    pub fn full_zone_count(&self) -> usize {
        self.zones
            .iter()
            .filter(|zone| zone.state() == ZoneState::Full)
            .count()
    }

    /// The zone currently receiving appends
    pub fn data_zone(&self) -> Option<Arc<Zone>> {
        self.flush_state.lock().data_zone.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ZoneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneManager")
            .field("zones", &self.zones.len())
            .field("writable", &self.writable.len())
            .field("immutable", &self.immutable_rx.len())
            .finish()
    }
}
