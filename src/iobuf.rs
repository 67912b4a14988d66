//! IOBuf Module
//!
//! Owned, page-aligned byte buffer moved between memory and the device.
//!
//! ## Responsibilities
//! - Allocate capacity rounded up to `PAGE_SIZE`, aligned to `PAGE_SIZE`
//! - Track written bytes (`size`) separately from `capacity`
//! - Pad to page boundaries before device I/O
//! - Expose a narrowed window after aligned reads (`shrink`)
//!
//! ## Layout
//! ```text
//! ┌───────────┬──────────────────────┬──────────────────────┐
//! │ skipped   │  visible window      │   free space         │
//! │ (shrink)  │  [start, start+size) │  available_size()    │
//! └───────────┴──────────────────────┴──────────────────────┘
//! 0                                                    capacity
//! ```

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::config::{align_to_page, PAGE_SIZE};
use crate::error::{Result, ZoneKvError};

/// Page-aligned growable byte buffer with a fixed capacity
pub struct IoBuf {
    ptr: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    /// Start of the visible window (moved forward by `shrink`)
    start: usize,
    /// Bytes in the visible window
    size: usize,
}

// Safety: IoBuf uniquely owns its allocation; shared access only hands out
// immutable slices.
unsafe impl Send for IoBuf {}
unsafe impl Sync for IoBuf {}

impl IoBuf {
    /// Allocate a zeroed buffer; capacity is rounded up to the page size
    ///
    /// # Panics
    /// If the rounded capacity exceeds `isize::MAX`. Callers pass configured
    /// sizes (bounded by `StoreConfig::validate`) or layout constants; sizes
    /// read from the device go through `try_with_capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(buf) => buf,
            Err(e) => panic!("{}", e),
        }
    }

    /// Allocate a zeroed buffer, rejecting capacities no layout can hold
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        let capacity = (align_to_page(capacity as u64) as usize).max(PAGE_SIZE);
        let layout = Layout::from_size_align(capacity, PAGE_SIZE).map_err(|_| {
            ZoneKvError::InvalidArgument(format!("no aligned layout for {} bytes", capacity))
        })?;
        // Safety: layout has non-zero size and a power-of-two alignment.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => std::alloc::handle_alloc_error(layout),
        };
        Ok(Self {
            ptr,
            layout,
            capacity,
            start: 0,
            size: 0,
        })
    }

    /// Copy existing bytes into a freshly page-aligned allocation
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buf = Self::with_capacity(data.len());
        buf.as_full_mut()[..data.len()].copy_from_slice(data);
        buf.size = data.len();
        buf
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written (or visible after `shrink`)
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Free bytes after the write cursor
    pub fn available_size(&self) -> usize {
        self.capacity - self.start - self.size
    }

    pub fn is_full(&self) -> bool {
        self.available_size() == 0
    }

    /// The visible window
    pub fn as_slice(&self) -> &[u8] {
        // Safety: [start, start+size) lies inside the zeroed allocation.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(self.start), self.size) }
    }

    /// The whole allocation, used as a device read target
    pub(crate) fn as_full_mut(&mut self) -> &mut [u8] {
        // Safety: the allocation is `capacity` bytes and exclusively borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    /// The whole allocation, used as a device write source
    pub(crate) fn as_full(&self) -> &[u8] {
        // Safety: the allocation is `capacity` bytes and always initialized.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    /// Mark the whole allocation as written (after a device read)
    pub(crate) fn fill_to_capacity(&mut self) {
        self.start = 0;
        self.size = self.capacity;
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Copy `data` at the write cursor; fails if it does not fit
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.available_size() {
            return Err(ZoneKvError::InvalidArgument(format!(
                "append of {} bytes exceeds available {} bytes",
                data.len(),
                self.available_size()
            )));
        }
        self.fill(data);
        Ok(())
    }

    /// Copy as much of `data` as fits and return the number of bytes taken
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available_size());
        let cursor = self.start + self.size;
        self.as_full_mut()[cursor..cursor + n].copy_from_slice(&data[..n]);
        self.size += n;
        n
    }

    /// Round `size` up to the page boundary, zero filling the gap
    pub fn align_to_page(&mut self) {
        let end = self.start + self.size;
        let aligned = (align_to_page(end as u64) as usize).min(self.capacity);
        self.zero_range(end, aligned);
        self.size = aligned - self.start;
    }

    /// Zero fill the remaining space so the buffer is full
    pub fn pad_to_capacity(&mut self) {
        let end = self.start + self.size;
        let capacity = self.capacity;
        self.zero_range(end, capacity);
        self.size = capacity - self.start;
    }

    fn zero_range(&mut self, from: usize, to: usize) {
        if from < to {
            self.as_full_mut()[from..to].fill(0);
        }
    }

    /// Forget the contents without releasing memory
    pub fn reset(&mut self) {
        self.start = 0;
        self.size = 0;
    }

    /// Narrow the visible window to `[offset, offset + length)` of the current window
    pub fn shrink(&mut self, offset: usize, length: usize) -> Result<()> {
        if offset + length > self.size {
            return Err(ZoneKvError::InvalidArgument(format!(
                "shrink window {}+{} exceeds buffer size {}",
                offset, length, self.size
            )));
        }
        self.start += offset;
        self.size = length;
        Ok(())
    }
}

impl Drop for IoBuf {
    fn drop(&mut self) {
        // Safety: allocated in `try_with_capacity` with this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl Clone for IoBuf {
    fn clone(&self) -> Self {
        let mut copy = Self::with_capacity(self.capacity);
        copy.as_full_mut().copy_from_slice(self.as_full());
        copy.start = self.start;
        copy.size = self.size;
        copy
    }
}

impl PartialEq for IoBuf {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity && self.as_slice() == other.as_slice()
    }
}

impl Eq for IoBuf {}

impl fmt::Debug for IoBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuf")
            .field("capacity", &self.capacity)
            .field("start", &self.start)
            .field("size", &self.size)
            .finish()
    }
}
