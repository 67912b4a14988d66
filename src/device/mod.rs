//! Device Module
//!
//! Positioned, page-aligned block I/O underneath the zone manager.
//!
//! ## Responsibilities
//! - Synchronous positioned `write`/`read` of page-aligned buffers
//! - `append` at a zone's write pointer, advancing it by the written size
//! - Enumerate the zones implied by device capacity / zone capacity
//! - Trim a zone's extent and rewind it to EMPTY (`reset_zone`)
//!
//! ## Implementations
//! - `FileDevice`: regular file or block device via `pread`/`pwrite`
//! - `MemDevice`: in-memory, with write fault injection for tests

mod file;
mod memory;

pub use file::FileDevice;
pub use memory::MemDevice;

use crate::config::PAGE_SIZE;
use crate::error::{Result, ZoneKvError};
use crate::iobuf::IoBuf;
use crate::zone::Zone;

/// Block device seen as an array of equally sized zones
///
/// Every offset and length must be a multiple of `PAGE_SIZE`.
pub trait ZoneDevice: Send + Sync {
    /// Total addressable bytes
    fn capacity(&self) -> u64;

    /// Bytes per zone
    fn zone_capacity(&self) -> u64;

    /// Write the visible bytes of `buf` at `offset`
    fn write(&self, offset: u64, buf: &IoBuf) -> Result<()>;

    /// Fill `buf` to its capacity from `offset`
    fn read(&self, offset: u64, buf: &mut IoBuf) -> Result<()>;

    /// Drop the contents of `[offset, offset + len)`; reads return zeros afterwards
    fn discard(&self, offset: u64, len: u64) -> Result<()>;

    /// Make completed writes durable
    fn sync(&self) -> Result<()>;

    /// Write `buf` at the zone's write pointer and advance it
    ///
    /// Returns the offset the buffer landed at.
    fn append(&self, zone: &Zone, buf: &IoBuf) -> Result<u64> {
        let len = buf.size() as u64;
        let wp = zone.write_pointer();
        if wp + len > zone.end() {
            return Err(ZoneKvError::Status(format!(
                "append of {} bytes overflows zone {} (wp {}, end {})",
                len,
                zone.id(),
                wp,
                zone.end()
            )));
        }
        self.write(wp, buf)?;
        zone.advance(len)
    }

    /// Zones implied by the device geometry, all EMPTY
    fn zones(&self) -> Vec<Zone> {
        let zone_capacity = self.zone_capacity();
        (0..self.capacity() / zone_capacity)
            .map(|id| Zone::new(id, id * zone_capacity, zone_capacity))
            .collect()
    }

    /// Trim the zone's extent and rewind it to EMPTY
    fn reset_zone(&self, zone: &Zone) -> Result<()> {
        self.discard(zone.offset(), zone.capacity())?;
        zone.reset();
        Ok(())
    }
}

/// Reject requests that are misaligned or run past the device end
pub(crate) fn check_io(offset: u64, len: u64, capacity: u64) -> Result<()> {
    let page = PAGE_SIZE as u64;
    if offset % page != 0 || len % page != 0 {
        return Err(ZoneKvError::InvalidArgument(format!(
            "unaligned device I/O: offset {} len {}",
            offset, len
        )));
    }
    if offset + len > capacity {
        return Err(ZoneKvError::InvalidArgument(format!(
            "device I/O [{}, {}) past capacity {}",
            offset,
            offset + len,
            capacity
        )));
    }
    Ok(())
}
