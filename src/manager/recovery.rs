//! Startup recovery
//!
//! ## Zone classification
//! - Footer present and metadata checksum valid → FULL, metadata replayed
//! - No footer but data in the first page → left OPEN by a crash; its
//!   records were never finalized, so the zone is reset
//! - Otherwise → EMPTY
//!
//! FULL zones are replayed in footer sequence order so a key rewritten in a
//! later zone ends up pointing at its newest record.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ZoneManager;
use crate::codec::{decode_zone_meta, ZoneFooter, FOOTER_SIZE};
use crate::config::{align_to_page, PAGE_SIZE};
use crate::error::{Result, ZoneKvError};
use crate::index::{DiskPointer, IndexValue};
use crate::iobuf::IoBuf;
use crate::zone::{now_micros, Zone};

impl ZoneManager {
    /// Rebuild zone states (and the index) from the device
    pub(super) fn recover_zone_states(&self) -> Result<()> {
        if !self.config.use_existing_db {
            for zone in &self.zones {
                self.device.reset_zone(zone)?;
                self.release_empty_zone(zone.id());
            }
            tracing::info!(zones = self.zones.len(), "Initialized new database");
            return Ok(());
        }

        let mut finished: Vec<(Arc<Zone>, ZoneFooter, IoBuf)> = Vec::new();
        let mut discarded = 0usize;

        for zone in &self.zones {
            let mut page = IoBuf::with_capacity(FOOTER_SIZE);
            self.device.read(zone.footer_offset(), &mut page)?;

            if ZoneFooter::is_present(page.as_slice()) {
                match self.read_zone_metadata(zone) {
                    Ok((footer, meta)) => {
                        finished.push((Arc::clone(zone), footer, meta));
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(zone_id = zone.id(), "Discarding zone with bad footer: {}", e);
                    }
                }
            } else {
                self.device.read(zone.offset(), &mut page)?;
                if page.as_slice().iter().all(|&b| b == 0) {
                    self.release_empty_zone(zone.id());
                    continue;
                }
                tracing::warn!(zone_id = zone.id(), "Discarding unfinished zone");
            }

            self.device.reset_zone(zone)?;
            self.release_empty_zone(zone.id());
            discarded += 1;
        }

        finished.sort_by_key(|(_, footer, _)| footer.sequence);
        let mut keys = 0usize;
        let mut full = 0usize;
        for (zone, footer, meta) in &finished {
            match self.replay_zone(zone, footer, meta.as_slice()) {
                Ok(count) => {
                    keys += count;
                    full += 1;
                }
                Err(e) => {
                    tracing::warn!(zone_id = zone.id(), "Discarding zone with bad metadata: {}", e);
                    self.device.reset_zone(zone)?;
                    self.release_empty_zone(zone.id());
                    discarded += 1;
                }
            }
        }

        let last_sequence = finished.last().map_or(0, |(_, footer, _)| footer.sequence);
        self.next_sequence.store(last_sequence + 1, Ordering::Release);

        tracing::info!(
            full,
            empty = self.empty_zone_count(),
            discarded,
            keys,
            "Recovered zone states"
        );
        Ok(())
    }

    /// Point the index at every record listed in a zone's metadata
    fn replay_zone(&self, zone: &Zone, footer: &ZoneFooter, meta: &[u8]) -> Result<usize> {
        let mut entries = Vec::with_capacity(footer.key_count as usize);
        for entry in decode_zone_meta(meta) {
            let (key, lba) = entry?;
            if !zone.contains(lba) || lba >= footer.metadata_offset {
                return Err(ZoneKvError::Corruption(format!(
                    "zone {} metadata points outside its data region: {}",
                    zone.id(),
                    lba
                )));
            }
            entries.push((key, lba));
        }

        // Record sizes are not stored; the gap to the next record bounds them
        let mut starts: Vec<u64> = entries.iter().map(|(_, lba)| *lba).collect();
        starts.sort_unstable();
        starts.dedup();
        let record_len = |lba: u64| -> u32 {
            let next = match starts.binary_search(&lba) {
                Ok(i) if i + 1 < starts.len() => starts[i + 1],
                _ => footer.metadata_offset,
            };
            (next - lba).min(u32::MAX as u64) as u32
        };

        for (key, lba) in &entries {
            let ptr = DiskPointer {
                lba: *lba,
                len: record_len(*lba),
            };
            if let Some(IndexValue::Disk(old)) = self.index.update(key, IndexValue::Disk(ptr)) {
                self.expire(old);
            }
        }

        zone.seal_write_pointer();
        zone.add_items(entries.len() as u64);
        zone.mark_full(footer.sequence, now_micros());
        tracing::debug!(
            zone_id = zone.id(),
            sequence = footer.sequence,
            keys = entries.len(),
            "Replayed zone metadata"
        );
        Ok(entries.len())
    }

    /// Read and verify a finished zone's footer and metadata block
    ///
    /// The returned buffer is narrowed to the unpadded metadata bytes.
    pub(super) fn read_zone_metadata(&self, zone: &Zone) -> Result<(ZoneFooter, IoBuf)> {
        let mut page = IoBuf::with_capacity(FOOTER_SIZE);
        self.device.read(zone.footer_offset(), &mut page)?;
        let footer = ZoneFooter::decode(page.as_slice())?;
        footer.validate_bounds(zone.offset(), zone.footer_offset())?;

        let meta_len = align_to_page(footer.metadata_size as u64).max(PAGE_SIZE as u64);
        let mut meta = IoBuf::try_with_capacity(meta_len as usize)?;
        self.device.read(footer.metadata_offset, &mut meta)?;
        meta.shrink(0, footer.metadata_size as usize)?;
        footer.verify_metadata(meta.as_slice())?;

        Ok((footer, meta))
    }
}
