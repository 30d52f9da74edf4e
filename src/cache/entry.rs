//! Resolved values and the cache entries that wrap them.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use crate::registry::{ConfigValue, ValueType};

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Cache,
    Environment,
    Store,
    Default,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSource::Cache => "cache",
            ValueSource::Environment => "environment",
            ValueSource::Store => "store",
            ValueSource::Default => "default",
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one resolution. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub key: String,
    pub value: ConfigValue,
    pub value_type: ValueType,
    pub source: ValueSource,
    pub requires_restart: bool,
    /// When the underlying record last changed, if the source knows.
    pub last_updated: Option<SystemTime>,
    /// When the fallback chain produced this value. Preserved across cache hits.
    pub resolved_at: SystemTime,
    pub ttl: Duration,
}

impl ResolvedValue {
    /// The same value as served by a cache hit.
    pub fn from_cache(&self) -> ResolvedValue {
        ResolvedValue {
            source: ValueSource::Cache,
            ..self.clone()
        }
    }
}

/// A cached value plus its access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ResolvedValue,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub ttl: Duration,
    /// Monotonic access sequence; orders LRU eviction without relying on
    /// clock resolution.
    pub(crate) last_access_tick: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: ResolvedValue, ttl: Duration, tick: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl,
            last_access_tick: tick,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    pub(crate) fn touch(&mut self, now: Instant, tick: u64) {
        self.last_accessed_at = now;
        self.access_count += 1;
        self.last_access_tick = tick;
    }

    /// Heuristic payload size: key (stored twice) plus the value.
    pub(crate) fn payload_bytes(&self) -> usize {
        self.value.key.len() * 2 + self.value.value.estimated_size()
    }
}
