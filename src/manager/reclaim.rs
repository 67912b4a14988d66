//! Garbage collection: returning FULL zones to the empty pool
//!
//! Reclaiming evicts the zone's keys from the index; it does not relocate
//! live records. A key is only evicted while the index still points at the
//! record in the reclaimed zone, so newer writes are never lost.

use std::sync::atomic::Ordering;

use super::ZoneManager;
use crate::codec::decode_zone_meta;
use crate::error::Result;
use crate::gc::select_gc_candidate;
use crate::index::EvictOutcome;
use crate::metrics::Counter;
use crate::zone::{now_micros, Zone, ZoneState};

impl ZoneManager {
    pub(super) fn gc_worker_loop(&self) {
        tracing::info!("GC worker started");
        while !self.gc_stop.load(Ordering::Acquire) {
            match self.gc() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => tracing::error!("GC failed: {}", e),
            }

            let mut requested = self.gc_requested.lock();
            if !*requested {
                self.gc_cv
                    .wait_for(&mut requested, self.config.worker_poll_interval);
            }
            *requested = false;
        }
        tracing::info!("GC worker stopped");
    }

    /// Nudge the GC worker
    pub(super) fn wake_gc(&self) {
        *self.gc_requested.lock() = true;
        self.gc_cv.notify_one();
    }

    /// Reclaim one zone if the empty pool is below the threshold
    ///
    /// Returns whether a zone was reclaimed.
    pub fn gc(&self) -> Result<bool> {
        let _guard = self.gc_lock.lock();

        let empty = self.empty_zone_count();
        if empty >= self.config.gc_threshold {
            return Ok(false);
        }

        let Some(zone) = select_gc_candidate(&self.zones, now_micros()) else {
            tracing::debug!(empty, "GC found no FULL zone to reclaim");
            return Ok(false);
        };

        self.reclaim_zone(&zone)?;
        Ok(true)
    }

    fn reclaim_zone(&self, zone: &Zone) -> Result<()> {
        let mut evicted = 0u64;
        let mut skipped = 0u64;
        let mut purge = false;

        match self.read_zone_metadata(zone) {
            Ok((_, meta)) => {
                for entry in decode_zone_meta(meta.as_slice()) {
                    match entry {
                        Ok((key, lba)) => match self.index.evict_if_at(key, lba) {
                            EvictOutcome::Evicted => evicted += 1,
                            EvictOutcome::Superseded | EvictOutcome::Missing => skipped += 1,
                        },
                        Err(e) => {
                            tracing::warn!(zone_id = zone.id(), "Zone metadata undecodable: {}", e);
                            purge = true;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(zone_id = zone.id(), "Zone footer unreadable: {}", e);
                purge = true;
            }
        }
        if purge {
            evicted += self.index.purge_disk_range(zone.offset(), zone.end()) as u64;
        }

        let expired_bytes = zone.expired_bytes();
        if let Err(e) = self.device.reset_zone(zone) {
            tracing::error!(zone_id = zone.id(), offset = zone.offset(), "Zone reset failed: {}", e);
            zone.set_state(ZoneState::Offline);
            return Err(e);
        }
        self.release_empty_zone(zone.id());

        self.metrics.incr(Counter::ZonesReclaimed);
        self.metrics.add(Counter::KeysEvicted, evicted);
        self.metrics.add(Counter::KeysSkipped, skipped);
        tracing::info!(
            zone_id = zone.id(),
            evicted,
            skipped,
            expired_bytes,
            purged = purge,
            "Zone reclaimed"
        );
        Ok(())
    }
}
