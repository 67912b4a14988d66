//! In-memory device
//!
//! Backs tests and benchmarks; `fail_writes` makes every write return an
//! I/O error so error paths can be exercised deterministically.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{check_io, ZoneDevice};
use crate::error::Result;
use crate::iobuf::IoBuf;

/// RAM-backed zone device
pub struct MemDevice {
    data: RwLock<Vec<u8>>,
    zone_capacity: u64,
    fail_writes: AtomicBool,
}

impl MemDevice {
    pub fn new(capacity: u64, zone_capacity: u64) -> Self {
        Self {
            data: RwLock::new(vec![0u8; capacity as usize]),
            zone_capacity,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of raw device bytes, bypassing alignment checks
    pub fn snapshot(&self, offset: u64, len: usize) -> Vec<u8> {
        let data = self.data.read();
        let start = offset as usize;
        data[start..start + len].to_vec()
    }
}

impl ZoneDevice for MemDevice {
    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn zone_capacity(&self) -> u64 {
        self.zone_capacity
    }

    fn write(&self, offset: u64, buf: &IoBuf) -> Result<()> {
        let bytes = buf.as_slice();
        let mut data = self.data.write();
        check_io(offset, bytes.len() as u64, data.len() as u64)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected write failure at offset {}", offset),
            )
            .into());
        }
        let start = offset as usize;
        data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut IoBuf) -> Result<()> {
        let data = self.data.read();
        let len = buf.capacity();
        check_io(offset, len as u64, data.len() as u64)?;
        let start = offset as usize;
        buf.as_full_mut().copy_from_slice(&data[start..start + len]);
        buf.fill_to_capacity();
        Ok(())
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        let mut data = self.data.write();
        check_io(offset, len, data.len() as u64)?;
        let start = offset as usize;
        data[start..start + len as usize].fill(0);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
