//! Metrics Module
//!
//! Counters passed explicitly to the components that update them.
//!
//! ## Design
//! - One `CachePadded` shard of atomic counters per slot; a thread always
//!   lands on the same slot, so producers, the flush worker and the GC worker
//!   mostly touch distinct cache lines
//! - `snapshot()` merges all shards into a plain `MetricsSnapshot`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Counter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Appends,
    BytesAppended,
    RecordsFlushed,
    DeviceFlushes,
    BytesFlushed,
    ZonesFinished,
    ZonesReclaimed,
    KeysEvicted,
    KeysSkipped,
    BackpressureWaits,
    ZoneSwitchStalls,
    DiskReads,
    RecordsReplayed,
}

const COUNTER_COUNT: usize = 13;

#[derive(Default)]
struct Shard {
    counters: [AtomicU64; COUNTER_COUNT],
}

/// Sharded counter set
pub struct Metrics {
    shards: Vec<CachePadded<Shard>>,
}

impl Metrics {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| CachePadded::new(Shard::default()))
                .collect(),
        }
    }

    fn local(&self) -> &Shard {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.local().counters[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.counters[counter as usize].load(Ordering::Relaxed))
            .sum()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            appends: self.get(Counter::Appends),
            bytes_appended: self.get(Counter::BytesAppended),
            records_flushed: self.get(Counter::RecordsFlushed),
            device_flushes: self.get(Counter::DeviceFlushes),
            bytes_flushed: self.get(Counter::BytesFlushed),
            zones_finished: self.get(Counter::ZonesFinished),
            zones_reclaimed: self.get(Counter::ZonesReclaimed),
            keys_evicted: self.get(Counter::KeysEvicted),
            keys_skipped: self.get(Counter::KeysSkipped),
            backpressure_waits: self.get(Counter::BackpressureWaits),
            zone_switch_stalls: self.get(Counter::ZoneSwitchStalls),
            disk_reads: self.get(Counter::DiskReads),
            records_replayed: self.get(Counter::RecordsReplayed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Merged point-in-time view of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub appends: u64,
    pub bytes_appended: u64,
    pub records_flushed: u64,
    pub device_flushes: u64,
    pub bytes_flushed: u64,
    pub zones_finished: u64,
    pub zones_reclaimed: u64,
    pub keys_evicted: u64,
    pub keys_skipped: u64,
    pub backpressure_waits: u64,
    pub zone_switch_stalls: u64,
    pub disk_reads: u64,
    /// Records re-encoded after a failed flush
    pub records_replayed: u64,
}

impl MetricsSnapshot {
    /// Sum of two snapshots (multi-store aggregation)
    pub fn merge(mut self, other: &MetricsSnapshot) -> Self {
        self.appends += other.appends;
        self.bytes_appended += other.bytes_appended;
        self.records_flushed += other.records_flushed;
        self.device_flushes += other.device_flushes;
        self.bytes_flushed += other.bytes_flushed;
        self.zones_finished += other.zones_finished;
        self.zones_reclaimed += other.zones_reclaimed;
        self.keys_evicted += other.keys_evicted;
        self.keys_skipped += other.keys_skipped;
        self.backpressure_waits += other.backpressure_waits;
        self.zone_switch_stalls += other.zone_switch_stalls;
        self.disk_reads += other.disk_reads;
        self.records_replayed += other.records_replayed;
        self
    }
}
