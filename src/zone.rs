//! Zone Module
//!
//! A fixed-capacity, append-only extent of the device.
//!
//! ## State Machine
//! ```text
//!   EMPTY ──open──► OPEN ──finish──► FULL ──GC reset──► EMPTY
//!                     │
//!                     └──I/O failure──► OFFLINE (terminal)
//! ```
//!
//! All fields are atomics: the flush worker advances the write pointer of
//! the single open zone while readers and the GC worker inspect others.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::PAGE_SIZE;
use crate::error::{Result, ZoneKvError};

/// Zone lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZoneState {
    Empty = 0,
    Open = 1,
    Full = 2,
    Offline = 3,
}

impl ZoneState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ZoneState::Empty,
            1 => ZoneState::Open,
            2 => ZoneState::Full,
            _ => ZoneState::Offline,
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZoneState::Empty => "EMPTY",
            ZoneState::Open => "OPEN",
            ZoneState::Full => "FULL",
            ZoneState::Offline => "OFFLINE",
        };
        f.write_str(name)
    }
}

/// Microseconds since the unix epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// One zone of the device
pub struct Zone {
    id: u64,
    /// Global byte offset of the zone start
    offset: u64,
    capacity: u64,

    /// Next writable global byte offset
    write_pointer: AtomicU64,
    state: AtomicU8,

    total_items: AtomicU64,
    expired_items: AtomicU64,
    expired_bytes: AtomicU64,

    open_time_us: AtomicU64,
    close_time_us: AtomicU64,
    /// Close order across the store, persisted in the footer
    sequence: AtomicU64,
}

impl Zone {
    pub fn new(id: u64, offset: u64, capacity: u64) -> Self {
        Self {
            id,
            offset,
            capacity,
            write_pointer: AtomicU64::new(offset),
            state: AtomicU8::new(ZoneState::Empty as u8),
            total_items: AtomicU64::new(0),
            expired_items: AtomicU64::new(0),
            expired_bytes: AtomicU64::new(0),
            open_time_us: AtomicU64::new(0),
            close_time_us: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// First byte past the zone
    pub fn end(&self) -> u64 {
        self.offset + self.capacity
    }

    /// The footer always occupies the last page
    pub fn footer_offset(&self) -> u64 {
        self.end() - PAGE_SIZE as u64
    }

    pub fn contains(&self, lba: u64) -> bool {
        lba >= self.offset && lba < self.end()
    }

    // =========================================================================
    // Write Pointer
    // =========================================================================

    pub fn write_pointer(&self) -> u64 {
        self.write_pointer.load(Ordering::Acquire)
    }

    /// Bytes between the write pointer and the zone end
    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.write_pointer())
    }

    /// Bytes written since the zone was opened
    pub fn written(&self) -> u64 {
        self.write_pointer() - self.offset
    }

    /// Move the write pointer forward by `len`, never past the zone end
    pub fn advance(&self, len: u64) -> Result<u64> {
        let wp = self.write_pointer();
        if wp + len > self.end() {
            return Err(ZoneKvError::Status(format!(
                "zone {} overflow: wp {} + {} > end {}",
                self.id,
                wp,
                len,
                self.end()
            )));
        }
        self.write_pointer.store(wp + len, Ordering::Release);
        Ok(wp)
    }

    /// Jump the write pointer to the zone end (footer written)
    pub(crate) fn seal_write_pointer(&self) {
        self.write_pointer.store(self.end(), Ordering::Release);
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> ZoneState {
        ZoneState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ZoneState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn mark_open(&self) {
        self.open_time_us.store(now_micros(), Ordering::Relaxed);
        self.set_state(ZoneState::Open);
    }

    pub(crate) fn mark_full(&self, sequence: u64, close_time_us: u64) {
        self.sequence.store(sequence, Ordering::Relaxed);
        self.close_time_us.store(close_time_us, Ordering::Relaxed);
        self.set_state(ZoneState::Full);
    }

    /// Back to a pristine EMPTY zone
    pub(crate) fn reset(&self) {
        self.write_pointer.store(self.offset, Ordering::Release);
        self.total_items.store(0, Ordering::Relaxed);
        self.expired_items.store(0, Ordering::Relaxed);
        self.expired_bytes.store(0, Ordering::Relaxed);
        self.open_time_us.store(0, Ordering::Relaxed);
        self.close_time_us.store(0, Ordering::Relaxed);
        self.sequence.store(0, Ordering::Relaxed);
        self.set_state(ZoneState::Empty);
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub(crate) fn add_items(&self, count: u64) {
        self.total_items.fetch_add(count, Ordering::Relaxed);
    }

    /// Account a record in this zone that is no longer referenced
    pub fn record_expired(&self, bytes: u64) {
        self.expired_items.fetch_add(1, Ordering::Relaxed);
        self.expired_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_items(&self) -> u64 {
        self.total_items.load(Ordering::Relaxed)
    }

    pub fn expired_items(&self) -> u64 {
        self.expired_items.load(Ordering::Relaxed)
    }

    pub fn expired_bytes(&self) -> u64 {
        self.expired_bytes.load(Ordering::Relaxed)
    }

    pub fn open_time_us(&self) -> u64 {
        self.open_time_us.load(Ordering::Relaxed)
    }

    pub fn close_time_us(&self) -> u64 {
        self.close_time_us.load(Ordering::Relaxed)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("write_pointer", &self.write_pointer())
            .field("state", &self.state())
            .field("expired_bytes", &self.expired_bytes())
            .finish()
    }
}
