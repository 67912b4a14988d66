//! GC Candidate Selection
//!
//! Pure scoring over FULL zones. Older zones and zones holding more dead
//! bytes are preferred:
//!
//! ```text
//! age_score     = age(zone)           * W_AGE     / (oldest_age + 1)
//! expired_score = expired_bytes(zone) * W_EXPIRED / (max_expired + 1)
//! score         = age_score + expired_score        (basis points, 0..=10000)
//! ```
//!
//! The scan keeps the target on `>=`, so among equal scores the last FULL
//! zone encountered wins.

use std::sync::Arc;

use crate::zone::{Zone, ZoneState};

/// Weight of the time since the zone was finished
pub const ZONE_AGE_WEIGHT: u64 = 50;

/// Weight of the bytes no longer referenced by the index
pub const EXPIRED_BYTES_WEIGHT: u64 = 50;

/// Weights are percentages; scores are reported in basis points
const SCORE_SCALE: u64 = 100;

/// Normalization inputs gathered across the candidates
#[derive(Debug, Clone, Copy, Default)]
struct ScoreBounds {
    oldest_age_us: u64,
    max_expired_bytes: u64,
}

fn zone_age(zone: &Zone, now_us: u64) -> u64 {
    now_us.saturating_sub(zone.close_time_us())
}

/// Score of one zone against the given bounds
fn score(zone: &Zone, now_us: u64, bounds: ScoreBounds) -> u64 {
    let age = zone_age(zone, now_us) as u128;
    let expired = zone.expired_bytes() as u128;
    let scale = SCORE_SCALE as u128;

    let age_score = age * (ZONE_AGE_WEIGHT as u128) * scale / (bounds.oldest_age_us as u128 + 1);
    let expired_score =
        expired * (EXPIRED_BYTES_WEIGHT as u128) * scale / (bounds.max_expired_bytes as u128 + 1);
    (age_score + expired_score) as u64
}

/// Pick the FULL zone with the highest score; `None` if no zone is FULL
pub fn select_gc_candidate(zones: &[Arc<Zone>], now_us: u64) -> Option<Arc<Zone>> {
    let candidates: Vec<&Arc<Zone>> = zones
        .iter()
        .filter(|zone| zone.state() == ZoneState::Full)
        .collect();

    let bounds = candidates.iter().fold(ScoreBounds::default(), |acc, zone| ScoreBounds {
        oldest_age_us: acc.oldest_age_us.max(zone_age(zone, now_us)),
        max_expired_bytes: acc.max_expired_bytes.max(zone.expired_bytes()),
    });

    let mut best: Option<(&Arc<Zone>, u64)> = None;
    for zone in candidates {
        let s = score(zone, now_us, bounds);
        if best.map_or(true, |(_, max)| s >= max) {
            best = Some((zone, s));
        }
    }

    best.map(|(zone, s)| {
        tracing::debug!(zone_id = zone.id(), score = s, "GC target selected");
        Arc::clone(zone)
    })
}
