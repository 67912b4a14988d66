//! Index Module
//!
//! Two-tier pointer map from key to the authoritative copy of its value.
//!
//! ## Responsibilities
//! - Memory tier: key → value still held by a write buffer (not yet on disk)
//! - Disk tier: key → logical block address of the encoded record
//! - Shard the key space so unrelated keys never share a lock
//! - Atomic tier swaps for flush confirmation and GC eviction
//!
//! ## Data Structure Choice
//! Each shard holds both tiers under one `RwLock`:
//! - `HashMap` for memory values (point lookups only)
//! - `BTreeMap` for disk pointers (ordered, compact for fixed-size values)
//!
//! Keeping both tiers of a key behind the same lock is what makes
//! `update`/`promote` a single atomic step instead of delete-then-put.

mod sharded;

use bytes::Bytes;

pub use sharded::{EvictOutcome, Index, Promotion};

/// Location of an encoded record on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskPointer {
    /// Global byte offset of the record header
    pub lba: u64,

    /// Encoded record size (header + key + value)
    pub len: u32,
}

/// Value held by the index for one key
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    /// Value still in a write buffer or in flight to the device
    Memory(Bytes),

    /// Value confirmed on the device
    Disk(DiskPointer),
}

impl IndexValue {
    pub fn is_memory(&self) -> bool {
        matches!(self, IndexValue::Memory(_))
    }

    pub fn disk_pointer(&self) -> Option<DiskPointer> {
        match self {
            IndexValue::Disk(ptr) => Some(*ptr),
            IndexValue::Memory(_) => None,
        }
    }
}
