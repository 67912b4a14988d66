//! Key hashing shared by every sharding layer (stores, write buffers, index)

/// djb2-style multiplicative hash over the key bytes
#[inline]
pub fn fast_hash(key: &[u8]) -> u64 {
    key.iter()
        .fold(0u64, |h, &c| (h << 5).wrapping_add(h).wrapping_add(c as u64))
}

/// Pick a shard in `[0, shards)` for `key`
///
/// Each layer passes a distinct `layer` salt so that keys routed to one store
/// still spread evenly over that store's write buffers and index shards.
#[inline]
pub fn shard_for(key: &[u8], layer: u64, shards: usize) -> usize {
    let mixed = fast_hash(key) ^ layer.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    // Final avalanche so the salt reaches the low bits
    let mixed = (mixed ^ (mixed >> 33)).wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    let mixed = mixed ^ (mixed >> 33);
    (mixed % shards as u64) as usize
}

pub(crate) const LAYER_STORE: u64 = 1;
pub(crate) const LAYER_WRITE_BUFFER: u64 = 2;
pub(crate) const LAYER_INDEX: u64 = 3;
