//! Sharded index implementation
//!
//! Hash-partitioned shards, each guarded by its own `RwLock`.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Result, ZoneKvError};
use crate::hash::{shard_for, LAYER_INDEX};

use super::{DiskPointer, IndexValue};

/// Result of confirming a flushed record against the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The key now points to the record; `replaced` is the older disk copy, if any
    Promoted { replaced: Option<DiskPointer> },

    /// A newer write or a delete won; the flushed record is already dead
    Superseded,
}

/// Result of a GC eviction attempt for one decoded (key, lba) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The key pointed at the reclaimed record and was removed
    Evicted,

    /// The key lives elsewhere now (newer record or still in memory)
    Superseded,

    /// The key is no longer indexed at all
    Missing,
}

#[derive(Default)]
struct Shard {
    memory: HashMap<Vec<u8>, Bytes>,
    disk: BTreeMap<Vec<u8>, DiskPointer>,
}

impl Shard {
    /// Memory tier wins: it always holds the fresher copy
    fn lookup(&self, key: &[u8]) -> Option<IndexValue> {
        if let Some(value) = self.memory.get(key) {
            return Some(IndexValue::Memory(value.clone()));
        }
        self.disk.get(key).map(|ptr| IndexValue::Disk(*ptr))
    }

    fn remove_both(&mut self, key: &[u8]) -> Option<IndexValue> {
        let memory = self.memory.remove(key).map(IndexValue::Memory);
        let disk = self.disk.remove(key).map(IndexValue::Disk);
        memory.or(disk)
    }
}

/// Concurrent two-tier index
///
/// ## Concurrency:
/// - Reads (`get`, `exists`) take a shard read lock
/// - Writes (`put`, `update`, `delete`, `promote`) take a shard write lock
/// - Keys in different shards never contend
pub struct Index {
    shards: Vec<RwLock<Shard>>,
}

impl Index {
    /// Create an index with `shard_count` independently locked shards
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(Shard::default())).collect(),
        }
    }

    fn shard(&self, key: &[u8]) -> &RwLock<Shard> {
        &self.shards[shard_for(key, LAYER_INDEX, self.shards.len())]
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Upsert into the tier matching the value kind
    ///
    /// The other tier is left untouched; use `update` for a single-tier swap.
    /// Returns the previous entry of the same tier.
    pub fn put(&self, key: &[u8], value: IndexValue) -> Option<IndexValue> {
        let mut shard = self.shard(key).write();
        match value {
            IndexValue::Memory(bytes) => shard
                .memory
                .insert(key.to_vec(), bytes)
                .map(IndexValue::Memory),
            IndexValue::Disk(ptr) => shard.disk.insert(key.to_vec(), ptr).map(IndexValue::Disk),
        }
    }

    /// Atomically replace whatever the key maps to
    ///
    /// Returns the previous authoritative entry. A concurrent `get` observes
    /// either the old or the new value, never a gap.
    pub fn update(&self, key: &[u8], value: IndexValue) -> Option<IndexValue> {
        let mut shard = self.shard(key).write();
        let previous = shard.remove_both(key);
        match value {
            IndexValue::Memory(bytes) => {
                shard.memory.insert(key.to_vec(), bytes);
            }
            IndexValue::Disk(ptr) => {
                shard.disk.insert(key.to_vec(), ptr);
            }
        }
        previous
    }

    /// Look up a key, memory tier first
    pub fn get(&self, key: &[u8]) -> Result<IndexValue> {
        self.shard(key).read().lookup(key).ok_or(ZoneKvError::NotFound)
    }

    /// Remove a key from every tier; returns whether anything was removed
    pub fn delete(&self, key: &[u8]) -> bool {
        self.remove(key).is_some()
    }

    /// Remove a key from every tier and return the authoritative entry
    pub fn remove(&self, key: &[u8]) -> Option<IndexValue> {
        self.shard(key).write().remove_both(key)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let shard = self.shard(key).read();
        shard.memory.contains_key(key) || shard.disk.contains_key(key)
    }

    pub fn exists_on_disk(&self, key: &[u8]) -> bool {
        self.shard(key).read().disk.contains_key(key)
    }

    // =========================================================================
    // Flush / GC Operations
    // =========================================================================

    /// Move a key from the memory tier to `ptr` once its record is on disk
    ///
    /// Only succeeds if the memory tier still holds the exact value that was
    /// flushed; a newer write or a delete in the meantime keeps precedence.
    pub fn promote(&self, key: &[u8], flushed: &Bytes, ptr: DiskPointer) -> Promotion {
        let mut shard = self.shard(key).write();
        let still_current = shard
            .memory
            .get(key)
            .is_some_and(|current| same_allocation(current, flushed));
        if !still_current {
            return Promotion::Superseded;
        }
        shard.memory.remove(key);
        let replaced = shard.disk.insert(key.to_vec(), ptr);
        Promotion::Promoted { replaced }
    }

    /// Remove a key only if its authoritative entry is the disk record at `lba`
    pub fn evict_if_at(&self, key: &[u8], lba: u64) -> EvictOutcome {
        let mut shard = self.shard(key).write();
        if shard.memory.contains_key(key) {
            return EvictOutcome::Superseded;
        }
        match shard.disk.get(key) {
            Some(ptr) if ptr.lba == lba => {
                shard.disk.remove(key);
                EvictOutcome::Evicted
            }
            Some(_) => EvictOutcome::Superseded,
            None => EvictOutcome::Missing,
        }
    }

    /// Drop every disk entry whose record starts inside `[start, end)`
    ///
    /// Full scan; only used when a zone's metadata cannot be decoded.
    pub fn purge_disk_range(&self, start: u64, end: u64) -> usize {
        let mut purged = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            let before = shard.disk.len();
            shard.disk.retain(|_, ptr| ptr.lba < start || ptr.lba >= end);
            purged += before - shard.disk.len();
        }
        purged
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let shard = shard.read();
                shard.memory.len()
                    + shard
                        .disk
                        .keys()
                        .filter(|key| !shard.memory.contains_key(key.as_slice()))
                        .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| {
            let shard = shard.read();
            shard.memory.is_empty() && shard.disk.is_empty()
        })
    }

    pub fn memory_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().memory.len()).sum()
    }

    pub fn disk_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().disk.len()).sum()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

/// `Bytes` clones share their allocation; identity tells which write a value came from
fn same_allocation(a: &Bytes, b: &Bytes) -> bool {
    a.as_ptr() == b.as_ptr() && a.len() == b.len()
}
