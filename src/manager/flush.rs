//! Flush path: sealed write buffers → encoded records on the open zone
//!
//! ## Record placement
//! A record's LBA is predicted before encoding as
//! `zone.write_pointer + staged_bytes`. Header and key never straddle an I/O
//! buffer flush: if they do not fit, the buffer is zero padded and flushed
//! first. Values are copied in chunks and may span several flushes.
//!
//! ## Durability contract
//! Flushed records are only promoted to the disk tier of the index after the
//! device append of the buffer holding their last byte returned.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::RecvTimeoutError;

use super::ZoneManager;
use crate::codec::{encode_record_header, encoded_record_len, meta_entry_len, RECORD_HEADER_SIZE};
use crate::config::{align_to_page, MAX_KEY_SIZE};
use crate::error::{Result, ZoneKvError};
use crate::index::{DiskPointer, Promotion};
use crate::iobuf::IoBuf;
use crate::metrics::Counter;
use crate::write_buffer::WriteBuffer;
use crate::zone::{Zone, ZoneState};

/// A record staged in the I/O buffer, waiting for its device append
pub(super) struct PendingRecord {
    key: Bytes,
    value: Bytes,
    ptr: DiskPointer,
}

/// State owned by whoever holds the flush lock
pub(super) struct FlushState {
    pub(super) data_zone: Option<Arc<Zone>>,

    /// Every (key, lba) written to the open zone, in write order
    pub(super) zone_keys: Vec<(Bytes, u64)>,

    /// Unpadded metadata size of `zone_keys`
    pub(super) zone_meta_bytes: u64,

    pub(super) io_buf: IoBuf,

    /// Records with bytes in `io_buf`
    pub(super) pending: Vec<PendingRecord>,

    /// Accepted items whose flush failed, oldest first; replayed before any
    /// queued buffer
    pub(super) stranded: Vec<(Bytes, Bytes)>,
}

impl FlushState {
    pub(super) fn new(io_buffer_size: usize) -> Self {
        Self {
            data_zone: None,
            zone_keys: Vec::new(),
            zone_meta_bytes: 0,
            io_buf: IoBuf::with_capacity(io_buffer_size),
            pending: Vec::new(),
            stranded: Vec::new(),
        }
    }

    /// Forget everything tied to the current zone
    pub(super) fn clear_zone(&mut self) {
        self.data_zone = None;
        self.zone_keys.clear();
        self.zone_meta_bytes = 0;
        self.io_buf.reset();
        self.pending.clear();
    }
}

impl ZoneManager {
    // =========================================================================
    // Worker Loop
    // =========================================================================

    pub(super) fn flush_worker_loop(&self) {
        tracing::info!("Flush worker started");
        while !self.stop.load(Ordering::Acquire) {
            if let Err(e) = self.try_flush() {
                tracing::error!("Flush failed: {}", e);
                if matches!(e, ZoneKvError::Busy(_)) {
                    continue;
                }
                std::thread::sleep(self.config.worker_poll_interval);
            }
        }

        if let Err(e) = self.drain_and_finish() {
            tracing::error!("Shutdown drain failed: {}", e);
            *self.drain_error.lock() = Some(e);
        }
        tracing::info!("Flush worker stopped");
    }

    /// Flush one sealed buffer if one arrives within the poll interval
    ///
    /// Opens a data zone first when none is usable. Returns whether a buffer
    /// was flushed.
    pub fn try_flush(&self) -> Result<bool> {
        let mut state = self.flush_state.lock();
        self.replay_stranded(&mut state)?;
        self.ensure_data_zone(&mut state)?;

        let buffer = match self
            .immutable_rx
            .recv_timeout(self.config.worker_poll_interval)
        {
            Ok(buffer) => buffer,
            Err(RecvTimeoutError::Timeout) => return Ok(false),
            Err(RecvTimeoutError::Disconnected) => return Err(ZoneKvError::ShuttingDown),
        };

        self.flush_write_buffer(&mut state, buffer)?;
        Ok(true)
    }

    /// Items stranded by an earlier failure go out before anything newer
    fn replay_stranded(&self, state: &mut FlushState) -> Result<()> {
        if state.stranded.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(&mut state.stranded);
        tracing::info!(items = items.len(), "Replaying stranded records");
        self.metrics.add(Counter::RecordsReplayed, items.len() as u64);
        self.flush_items(state, items)
    }

    /// Push every queued and writable buffer to the device
    ///
    /// On `Ok` every write accepted before the call is on disk and promoted
    /// in the index. On error the unflushed writes stay queued for the next
    /// flush.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.flush_state.lock();
        self.flush_all_buffers(&mut state)?;
        self.device.sync()
    }

    /// Shutdown drain: flush everything, then finish the open zone
    pub(super) fn drain_and_finish(&self) -> Result<()> {
        let mut state = self.flush_state.lock();
        self.flush_all_buffers(&mut state)?;

        let has_keys = state.data_zone.is_some() && !state.zone_keys.is_empty();
        if has_keys {
            self.finish_zone_locked(&mut state)?;
        }
        tracing::info!(finished_open_zone = has_keys, "Write buffers drained");
        Ok(())
    }

    /// Queue first, then each shard under its lock so buffers of the same
    /// shard reach the device in the order they were filled
    fn flush_all_buffers(&self, state: &mut FlushState) -> Result<()> {
        self.replay_stranded(state)?;
        self.drain_queue(state)?;
        for shard in &self.writable {
            let mut buffer = shard.lock();
            // A producer may have queued an older buffer of this shard meanwhile
            self.drain_queue(state)?;
            if buffer.is_empty() {
                continue;
            }
            buffer.mark_immutable();
            let fresh = WriteBuffer::new(self.config.write_buffer_size);
            let sealed = std::mem::replace(&mut *buffer, fresh);
            self.flush_write_buffer(state, sealed)?;
        }
        Ok(())
    }

    fn drain_queue(&self, state: &mut FlushState) -> Result<()> {
        while let Ok(buffer) = self.immutable_rx.try_recv() {
            self.flush_write_buffer(state, buffer)?;
        }
        Ok(())
    }

    // =========================================================================
    // Buffer Encoding
    // =========================================================================

    fn flush_write_buffer(&self, state: &mut FlushState, buffer: WriteBuffer) -> Result<()> {
        self.flush_items(state, buffer.into_items())
    }

    /// Encode every item, forcing the last one to disk
    ///
    /// On failure the items not yet on the device, including records the
    /// failed append dropped, are kept in `stranded` in their original order.
    fn flush_items(&self, state: &mut FlushState, items: Vec<(Bytes, Bytes)>) -> Result<()> {
        let count = items.len();
        let mut items = items.into_iter().enumerate();

        while let Some((i, (key, value))) = items.next() {
            let force_flush = i + 1 == count;
            let staged = self
                .ensure_zone_capacity(state, key.len(), value.len())
                .and_then(|_| self.stage_record(state, &key, &value));
            let result = match staged {
                Ok((zone, lba)) => self.commit_record(state, &zone, key, value, lba, force_flush),
                Err(e) => {
                    state.stranded.push((key, value));
                    Err(e)
                }
            };
            if let Err(e) = result {
                state.stranded.extend(items.by_ref().map(|(_, item)| item));
                tracing::warn!(stranded = state.stranded.len(), "Flush interrupted: {}", e);
                return Err(e);
            }
        }

        tracing::debug!(items = count, "Write buffer flushed");
        Ok(())
    }

    /// Bytes the next record may consume from the write pointer, including
    /// the metadata growth it causes
    fn required_space(&self, state: &FlushState, key_len: usize, value_len: usize) -> u64 {
        let io_buf = &state.io_buf;
        // Header and key that do not fit force the whole buffer out padded
        let staged = if RECORD_HEADER_SIZE + key_len > io_buf.available_size() {
            io_buf.capacity() as u64
        } else {
            io_buf.size() as u64
        };
        let meta = align_to_page(state.zone_meta_bytes + meta_entry_len(MAX_KEY_SIZE));
        staged + self.worst_case_item(value_len) + meta
    }

    /// Switch zones when the next record might not fit before the footer
    fn ensure_zone_capacity(
        &self,
        state: &mut FlushState,
        key_len: usize,
        value_len: usize,
    ) -> Result<()> {
        self.ensure_data_zone(state)?;
        let fits = |state: &FlushState| {
            state.data_zone.as_ref().is_some_and(|zone| {
                zone.write_pointer() + self.required_space(state, key_len, value_len)
                    <= zone.footer_offset()
            })
        };
        if fits(state) {
            return Ok(());
        }

        self.switch_zone_locked(state)?;
        if !fits(state) {
            return Err(ZoneKvError::InvalidArgument(format!(
                "record with {} byte value does not fit an empty zone",
                value_len
            )));
        }
        Ok(())
    }

    /// Stage one record; returns its predicted LBA
    ///
    /// Opens a data zone if none is open. Exposed so the record placement
    /// rules can be exercised directly.
    pub fn try_flush_single_item(&self, key: Bytes, value: Bytes, force_flush: bool) -> Result<u64> {
        self.check_item(&key, &value)?;
        let mut state = self.flush_state.lock();
        self.ensure_zone_capacity(&mut state, key.len(), value.len())?;
        let (zone, lba) = self.stage_record(&mut state, &key, &value)?;
        self.commit_record(&mut state, &zone, key, value, lba, force_flush)?;
        Ok(lba)
    }

    /// Copy header, key and value into the I/O buffer; returns the zone and
    /// the record's LBA
    ///
    /// The record is not yet pending: if this fails, nothing of it will be
    /// confirmed.
    fn stage_record(
        &self,
        state: &mut FlushState,
        key: &[u8],
        value: &[u8],
    ) -> Result<(Arc<Zone>, u64)> {
        let zone = state
            .data_zone
            .clone()
            .ok_or_else(|| ZoneKvError::Status("no open data zone".to_string()))?;

        let mut lba = zone.write_pointer() + state.io_buf.size() as u64;
        if RECORD_HEADER_SIZE + key.len() > state.io_buf.available_size() {
            // Header and key start in fresh buffer space
            state.io_buf.pad_to_capacity();
            self.flush_and_reset_locked(state)?;
            lba = zone.write_pointer();
        }

        state
            .io_buf
            .append(&encode_record_header(key.len() as u16, value.len() as u32))?;
        state.io_buf.append(key)?;

        let mut rest = value;
        loop {
            let taken = state.io_buf.fill(rest);
            rest = &rest[taken..];
            if state.io_buf.is_full() {
                self.flush_and_reset_locked(state)?;
            }
            if rest.is_empty() {
                break;
            }
        }
        Ok((zone, lba))
    }

    /// Register a staged record for promotion, then optionally flush
    fn commit_record(
        &self,
        state: &mut FlushState,
        zone: &Zone,
        key: Bytes,
        value: Bytes,
        lba: u64,
        force_flush: bool,
    ) -> Result<()> {
        let ptr = DiskPointer {
            lba,
            len: encoded_record_len(key.len(), value.len()) as u32,
        };
        state.zone_meta_bytes += meta_entry_len(key.len());
        state.zone_keys.push((key.clone(), lba));
        state.pending.push(PendingRecord { key, value, ptr });
        zone.add_items(1);

        if force_flush {
            state.io_buf.align_to_page();
            self.flush_and_reset_locked(state)?;
        }
        Ok(())
    }

    // =========================================================================
    // Device Append + Index Confirmation
    // =========================================================================

    /// Bytes staged in the I/O buffer, not yet appended to the device
    pub fn staged_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.flush_state.lock().io_buf.as_slice())
    }

    /// Page-align and flush the staged bytes, then confirm pending records
    pub fn flush_and_reset_io_buffer(&self) -> Result<()> {
        let mut state = self.flush_state.lock();
        state.io_buf.align_to_page();
        self.flush_and_reset_locked(&mut state)
    }

    /// Append the (page-aligned) staging buffer to the data zone and promote
    /// the records it completed
    pub(super) fn flush_and_reset_locked(&self, state: &mut FlushState) -> Result<()> {
        if !state.io_buf.is_empty() {
            let zone = state
                .data_zone
                .clone()
                .ok_or_else(|| ZoneKvError::Status("no open data zone".to_string()))?;

            let len = state.io_buf.size() as u64;
            if let Err(e) = self.device.append(&zone, &state.io_buf) {
                tracing::error!(
                    zone_id = zone.id(),
                    offset = zone.write_pointer(),
                    len,
                    "Zone append failed, taking zone offline: {}",
                    e
                );
                self.take_zone_offline(state, &zone);
                return Err(e);
            }
            self.metrics.incr(Counter::DeviceFlushes);
            self.metrics.add(Counter::BytesFlushed, len);
        }
        state.io_buf.reset();

        let flushed = state.pending.len() as u64;
        for record in state.pending.drain(..) {
            match self.index.promote(&record.key, &record.value, record.ptr) {
                Promotion::Promoted { replaced: Some(old) } => self.expire(old),
                Promotion::Promoted { replaced: None } => {}
                Promotion::Superseded => self.expire(record.ptr),
            }
        }
        self.metrics.add(Counter::RecordsFlushed, flushed);
        Ok(())
    }

    /// A zone that failed I/O is never written again
    ///
    /// Records still pending stay served from the memory tier and are
    /// stranded for the next flush to write elsewhere.
    pub(super) fn take_zone_offline(&self, state: &mut FlushState, zone: &Zone) {
        zone.set_state(ZoneState::Offline);
        let pending = std::mem::take(&mut state.pending);
        state
            .stranded
            .extend(pending.into_iter().map(|record| (record.key, record.value)));
        state.clear_zone();
    }
}
