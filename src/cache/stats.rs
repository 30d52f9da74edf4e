//! Cache telemetry.

use serde::Serialize;

/// Share of the score driven by hit rate.
const HIT_RATE_WEIGHT: f64 = 0.5;
/// Share of the score driven by spare memory.
const MEMORY_WEIGHT: f64 = 0.3;
/// Share of the score driven by how close occupancy is to the target.
const FULLNESS_WEIGHT: f64 = 0.2;
/// Occupancy ratio considered ideal.
const TARGET_FULLNESS: f64 = 0.7;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// TTL removals plus LRU and memory-pressure evictions.
    pub evictions: u64,
    pub expirations: u64,
    pub lru_evictions: u64,
    pub memory_evictions: u64,
    pub invalidations: u64,
    /// Times the cache state was found poisoned and reset.
    pub corruptions: u64,
    pub size: usize,
    pub max_entries: usize,
    pub estimated_memory_bytes: usize,
    pub max_memory_bytes: usize,
    pub hit_rate: f64,
    pub avg_access_time_ms: f64,
    pub efficiency_score: f64,
}

/// Hit rate as a ratio in `[0, 1]`; zero before any lookup.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Weighted blend of hit rate, inverse memory pressure and fullness.
///
/// Fullness scores 1.0 at the 70% target and falls linearly to 0.0 at both
/// an empty and a full cache.
pub fn efficiency_score(hit_rate: f64, memory_pressure: f64, fullness: f64) -> f64 {
    let memory_score = 1.0 - memory_pressure.clamp(0.0, 1.0);
    let fullness = fullness.clamp(0.0, 1.0);
    let fullness_score = if fullness <= TARGET_FULLNESS {
        fullness / TARGET_FULLNESS
    } else {
        (1.0 - fullness) / (1.0 - TARGET_FULLNESS)
    };
    HIT_RATE_WEIGHT * hit_rate.clamp(0.0, 1.0)
        + MEMORY_WEIGHT * memory_score
        + FULLNESS_WEIGHT * fullness_score
}
