//! Bounded TTL + LRU cache for resolved configuration values.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cache::entry::{CacheEntry, ResolvedValue};
use crate::cache::stats::{self, CacheStats};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Fixed per-entry overhead used by the memory heuristic (map slot, entry
/// struct, timestamps, `ResolvedValue` fields).
pub const ENTRY_OVERHEAD_BYTES: usize = 256;

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    payload_bytes: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    lru_evictions: u64,
    memory_evictions: u64,
    invalidations: u64,
    corruptions: u64,
    lookups: u64,
    lookup_nanos: u128,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn estimated_memory(&self) -> usize {
        self.entries.len() * ENTRY_OVERHEAD_BYTES + self.payload_bytes
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.payload_bytes = self.payload_bytes.saturating_sub(entry.payload_bytes());
        Some(entry)
    }

    /// Drop the single least-recently-accessed entry.
    fn evict_lru(&mut self) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access_tick)
            .map(|(key, _)| key.clone())?;
        self.remove(&victim);
        self.evictions += 1;
        Some(victim)
    }
}

/// Thread-safe cache of [`ResolvedValue`]s.
///
/// The map and every counter live behind one mutex. A poisoned mutex is
/// treated as a corrupted cache: entries are dropped and the lookup that
/// noticed it becomes a miss.
#[derive(Debug)]
pub struct ConfigCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    max_memory_bytes: usize,
    default_ttl: Duration,
}

impl ConfigCache {
    pub fn new(max_entries: usize, max_memory_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries,
            max_memory_bytes,
            default_ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_entries,
            config.max_memory_bytes,
            Duration::from_secs(config.default_ttl_secs),
        )
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Config cache state poisoned; dropping all entries");
                let mut guard = poisoned.into_inner();
                guard.entries.clear();
                guard.payload_bytes = 0;
                guard.corruptions += 1;
                self.state.clear_poison();
                guard
            }
        }
    }

    /// Look up a live entry, refreshing its recency.
    ///
    /// Expired entries are removed here and count as both a miss and an
    /// eviction.
    pub fn get(&self, key: &str) -> Option<ResolvedValue> {
        let started = Instant::now();
        let mut state = self.lock();
        let now = Instant::now();

        let expired = state.entries.get(key).map(|entry| entry.is_expired(now));
        let result = match expired {
            None => {
                state.misses += 1;
                None
            }
            Some(true) => {
                state.remove(key);
                state.misses += 1;
                state.evictions += 1;
                state.expirations += 1;
                metrics::record_cache_eviction("expired");
                tracing::debug!(key = %key, "Cache entry expired on read");
                None
            }
            Some(false) => {
                let tick = state.next_tick();
                state.hits += 1;
                state.entries.get_mut(key).map(|entry| {
                    entry.touch(now, tick);
                    entry.value.clone()
                })
            }
        };

        state.lookups += 1;
        state.lookup_nanos += started.elapsed().as_nanos();
        result
    }

    /// Insert or replace an entry. `ttl` of `None` uses the default TTL.
    pub fn set(&self, key: &str, value: ResolvedValue, ttl: Option<Duration>) {
        if self.max_entries == 0 {
            return;
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut state = self.lock();
        let is_new = !state.entries.contains_key(key);

        if state.estimated_memory() > self.max_memory_bytes {
            if let Some(victim) = state.evict_lru() {
                state.memory_evictions += 1;
                metrics::record_cache_eviction("memory");
                tracing::debug!(key = %victim, "Evicted cache entry under memory pressure");
            }
        }

        if is_new && state.entries.len() >= self.max_entries {
            if let Some(victim) = state.evict_lru() {
                state.lru_evictions += 1;
                metrics::record_cache_eviction("lru");
                tracing::debug!(key = %victim, "Evicted least recently used cache entry");
            }
        }

        let tick = state.next_tick();
        let entry = CacheEntry::new(value, ttl, tick);
        state.payload_bytes += entry.payload_bytes();
        if let Some(previous) = state.entries.insert(key.to_string(), entry) {
            state.payload_bytes = state.payload_bytes.saturating_sub(previous.payload_bytes());
        }
        metrics::record_cache_size(state.entries.len());
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let removed = state.remove(key).is_some();
        if removed {
            state.invalidations += 1;
            metrics::record_cache_size(state.entries.len());
        }
        removed
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.payload_bytes = 0;
        state.invalidations += count as u64;
        metrics::record_cache_size(0);
        count
    }

    /// Remove every expired entry regardless of recency.
    pub fn cleanup_expired(&self) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
            metrics::record_cache_eviction("expired");
        }
        let count = expired.len();
        state.evictions += count as u64;
        state.expirations += count as u64;
        if count > 0 {
            metrics::record_cache_size(state.entries.len());
        }
        count
    }

    /// Snapshot of an entry without touching its recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let size = state.entries.len();
        let estimated_memory_bytes = state.estimated_memory();
        let hit_rate = stats::hit_rate(state.hits, state.misses);
        let memory_pressure = if self.max_memory_bytes == 0 {
            1.0
        } else {
            estimated_memory_bytes as f64 / self.max_memory_bytes as f64
        };
        let fullness = if self.max_entries == 0 {
            0.0
        } else {
            size as f64 / self.max_entries as f64
        };
        let avg_access_time_ms = if state.lookups == 0 {
            0.0
        } else {
            state.lookup_nanos as f64 / state.lookups as f64 / 1_000_000.0
        };

        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            lru_evictions: state.lru_evictions,
            memory_evictions: state.memory_evictions,
            invalidations: state.invalidations,
            corruptions: state.corruptions,
            size,
            max_entries: self.max_entries,
            estimated_memory_bytes,
            max_memory_bytes: self.max_memory_bytes,
            hit_rate,
            avg_access_time_ms,
            efficiency_score: stats::efficiency_score(hit_rate, memory_pressure, fullness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::ValueSource;
    use crate::registry::ConfigValue;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn resolved(key: &str, value: i64) -> ResolvedValue {
        ResolvedValue {
            key: key.to_string(),
            value: ConfigValue::Integer(value),
            value_type: crate::registry::ValueType::Integer,
            source: ValueSource::Store,
            requires_restart: false,
            last_updated: None,
            resolved_at: SystemTime::now(),
            ttl: Duration::from_secs(60),
        }
    }

    fn cache(max_entries: usize) -> ConfigCache {
        ConfigCache::new(max_entries, 1024 * 1024, Duration::from_secs(60))
    }

    #[test]
    fn test_get_set_roundtrip() {
        let cache = cache(10);
        assert!(cache.get("a").is_none());

        cache.set("a", resolved("a", 1), None);
        let hit = cache.get("a").unwrap();
        assert_eq!(hit.value, ConfigValue::Integer(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(cache.peek("a").unwrap().access_count, 1);
    }

    #[test]
    fn test_ttl_expiry_counts_one_eviction() {
        let cache = cache(10);
        cache.set("short", resolved("short", 1), Some(Duration::from_millis(20)));
        assert!(cache.get("short").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("short").is_none());
        assert!(cache.get("short").is_none());

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_lru_evicts_oldest_access() {
        let cache = cache(3);
        cache.set("a", resolved("a", 1), None);
        cache.set("b", resolved("b", 2), None);
        cache.set("c", resolved("c", 3), None);

        // Touching "a" makes "b" the oldest.
        assert!(cache.get("a").is_some());
        cache.set("d", resolved("d", 4), None);

        assert!(cache.peek("b").is_none());
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("c").is_some());
        assert!(cache.peek("d").is_some());
        let stats = cache.stats();
        assert_eq!(stats.lru_evictions, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let cache = cache(2);
        cache.set("a", resolved("a", 1), None);
        cache.set("b", resolved("b", 2), None);
        cache.set("a", resolved("a", 10), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a").unwrap().value, ConfigValue::Integer(10));
    }

    #[test]
    fn test_memory_pressure_evicts_one_entry() {
        // Room for roughly one entry.
        let cache = ConfigCache::new(100, ENTRY_OVERHEAD_BYTES, Duration::from_secs(60));
        cache.set("a", resolved("a", 1), None);
        cache.set("b", resolved("b", 2), None);

        assert!(cache.peek("a").is_none());
        assert!(cache.peek("b").is_some());
        assert_eq!(cache.stats().memory_evictions, 1);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let cache = cache(10);
        cache.set("old", resolved("old", 1), Some(Duration::from_millis(10)));
        cache.set("fresh", resolved("fresh", 2), Some(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.peek("old").is_none());
        assert!(cache.peek("fresh").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = cache(10);
        cache.set("a", resolved("a", 1), None);
        cache.set("b", resolved("b", 2), None);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().estimated_memory_bytes, 0);
    }

    #[test]
    fn test_poisoned_state_degrades_to_miss() {
        let cache = Arc::new(cache(10));
        cache.set("a", resolved("a", 1), None);

        let poisoner = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.lock().unwrap();
            panic!("poison the cache");
        })
        .join();

        assert!(cache.get("a").is_none());
        let stats = cache.stats();
        assert_eq!(stats.corruptions, 1);

        cache.set("a", resolved("a", 2), None);
        assert!(cache.get("a").is_some());
    }
}
