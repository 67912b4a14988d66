//! Write Buffer
//!
//! Bounded, append-only collection of (key, value) pairs that producers fill
//! and the flush worker drains.
//!
//! ## Lifecycle
//! ```text
//!   mutable ──(put reaches capacity / mark_immutable)──► immutable ──► flushed, dropped
//! ```
//! A key written twice appears twice; the index decides which copy is live.

use bytes::Bytes;

use crate::error::{Result, ZoneKvError};

/// One buffered write
pub type BufferItem = (Bytes, Bytes);

/// In-memory buffer of pending writes
#[derive(Debug)]
pub struct WriteBuffer {
    items: Vec<BufferItem>,
    used_bytes: u64,
    capacity_bytes: u64,
    immutable: bool,
}

impl WriteBuffer {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            items: Vec::new(),
            used_bytes: 0,
            capacity_bytes,
            immutable: false,
        }
    }

    /// Append a pair; the put that reaches capacity seals the buffer
    pub fn put(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        if self.immutable {
            return Err(ZoneKvError::BufferSealed);
        }
        self.used_bytes += (key.len() + value.len()) as u64;
        self.items.push((key, value));
        if self.is_full() {
            self.immutable = true;
        }
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.used_bytes >= self.capacity_bytes
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Seal the buffer; idempotent
    pub fn mark_immutable(&mut self) {
        self.immutable = true;
    }

    /// Buffered pairs in insertion order
    pub fn items(&self) -> &[BufferItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<BufferItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }
}
