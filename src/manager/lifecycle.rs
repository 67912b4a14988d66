//! Zone lifecycle: opening the data zone, finishing it, waiting for space

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use super::flush::FlushState;
use super::ZoneManager;
use crate::codec::{encode_zone_meta, ZoneFooter};
use crate::error::{Result, ZoneKvError};
use crate::metrics::Counter;
use crate::zone::{now_micros, ZoneState};

impl ZoneManager {
    /// Finish the open zone (if it holds keys) and open an empty one
    pub fn switch_data_zone(&self) -> Result<()> {
        let mut state = self.flush_state.lock();
        self.switch_zone_locked(&mut state)
    }

    /// Write metadata and footer of the open zone and mark it FULL
    ///
    /// Fails if no zone is open or nothing was written to it.
    pub fn finish_current_data_zone(&self) -> Result<()> {
        let mut state = self.flush_state.lock();
        self.finish_zone_locked(&mut state)
    }

    /// Open a zone unless a usable one is already open
    pub(super) fn ensure_data_zone(&self, state: &mut FlushState) -> Result<()> {
        let usable = state
            .data_zone
            .as_ref()
            .is_some_and(|zone| zone.state() == ZoneState::Open);
        if usable {
            return Ok(());
        }
        self.switch_zone_locked(state)
    }

    pub(super) fn switch_zone_locked(&self, state: &mut FlushState) -> Result<()> {
        if let Some(zone) = state.data_zone.clone() {
            let untouched = zone.state() == ZoneState::Open
                && state.zone_keys.is_empty()
                && zone.written() == 0;
            if untouched {
                return Ok(());
            }
            if zone.state() == ZoneState::Open {
                self.finish_zone_locked(state)?;
            } else {
                state.clear_zone();
            }
        }

        let id = self.take_empty_zone()?;
        let zone = Arc::clone(&self.zones[id as usize]);
        zone.mark_open();
        tracing::debug!(zone_id = zone.id(), offset = zone.offset(), "Data zone opened");
        state.data_zone = Some(zone);
        Ok(())
    }

    pub(super) fn finish_zone_locked(&self, state: &mut FlushState) -> Result<()> {
        let zone = state.data_zone.clone().ok_or_else(|| {
            ZoneKvError::Io(io::Error::new(io::ErrorKind::Other, "no open data zone to finish"))
        })?;
        if state.zone_keys.is_empty() {
            return Err(ZoneKvError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("zone {} has no keys to finish", zone.id()),
            )));
        }

        // Records must be on the device before the metadata that points at them
        if !state.io_buf.is_empty() || !state.pending.is_empty() {
            state.io_buf.align_to_page();
            self.flush_and_reset_locked(state)?;
        }

        let (meta, meta_size) = encode_zone_meta(&state.zone_keys)?;
        let meta_offset = zone.write_pointer();
        let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel);
        let footer = ZoneFooter::new(
            state.zone_keys.len() as u32,
            &meta.as_slice()[..meta_size as usize],
            meta_offset,
            sequence,
        );

        let written = self
            .device
            .append(&zone, &meta)
            .and_then(|_| footer.encode())
            .and_then(|page| self.device.write(zone.footer_offset(), &page))
            .and_then(|_| self.device.sync());
        if let Err(e) = written {
            tracing::error!(
                zone_id = zone.id(),
                offset = meta_offset,
                "Finishing zone failed, taking zone offline: {}",
                e
            );
            self.take_zone_offline(state, &zone);
            return Err(e);
        }

        let data_bytes = meta_offset - zone.offset();
        zone.seal_write_pointer();
        let close_us = now_micros();
        zone.mark_full(sequence, close_us);
        self.metrics.incr(Counter::ZonesFinished);

        let elapsed_us = close_us.saturating_sub(zone.open_time_us()).max(1);
        let throughput_mbps =
            data_bytes as f64 / elapsed_us as f64 * 1_000_000.0 / (1u64 << 20) as f64;
        tracing::info!(
            zone_id = zone.id(),
            sequence,
            keys = state.zone_keys.len(),
            bytes = data_bytes,
            meta_bytes = meta_size,
            throughput_mbps = %format!("{:.2}", throughput_mbps),
            "Zone finished"
        );

        state.clear_zone();
        Ok(())
    }

    /// Pop an empty zone, waiting for GC while the pool is exhausted
    ///
    /// Runs a GC pass inline when no GC worker is alive. Gives up with
    /// `Busy` after `append_timeout`.
    fn take_empty_zone(&self) -> Result<u64> {
        let deadline = Instant::now() + self.config.append_timeout;
        let mut stalled = false;

        let mut pool = self.empty_zones.lock();
        loop {
            if let Some(id) = pool.pop_front() {
                let remaining = pool.len();
                drop(pool);
                if remaining < self.config.gc_threshold {
                    self.wake_gc();
                }
                return Ok(id);
            }

            if !stalled {
                stalled = true;
                self.metrics.incr(Counter::ZoneSwitchStalls);
                tracing::warn!("No empty zone available, waiting for GC");
            }

            if !self.gc_active.load(Ordering::Acquire) {
                drop(pool);
                let reclaimed = self.gc()?;
                pool = self.empty_zones.lock();
                if !reclaimed && pool.is_empty() {
                    return Err(ZoneKvError::Busy(
                        "no empty zone and nothing to reclaim".to_string(),
                    ));
                }
                continue;
            }

            self.wake_gc();
            if Instant::now() >= deadline {
                return Err(ZoneKvError::Busy(format!(
                    "no empty zone within {:?}",
                    self.config.append_timeout
                )));
            }
            self.empty_zone_cv
                .wait_for(&mut pool, self.config.worker_poll_interval);
        }
    }

    /// Return a zone to the empty pool and wake a waiting writer
    pub(super) fn release_empty_zone(&self, id: u64) {
        self.empty_zones.lock().push_back(id);
        self.empty_zone_cv.notify_all();
    }
}
