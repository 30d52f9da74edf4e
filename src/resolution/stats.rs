//! Resolution counters and the aggregated service view.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::{CacheStats, ValueSource};
use crate::events::BusStats;

/// Lock-free counters updated on every resolution and write.
#[derive(Debug, Default)]
pub struct ResolutionStats {
    resolutions: AtomicU64,
    from_cache: AtomicU64,
    from_environment: AtomicU64,
    from_store: AtomicU64,
    from_default: AtomicU64,
    not_found: AtomicU64,
    caller_fallbacks: AtomicU64,
    store_errors: AtomicU64,
    coercion_failures: AtomicU64,
    missing_schemas: AtomicU64,
    notifications: AtomicU64,
    writes: AtomicU64,
    rejected_writes: AtomicU64,
}

impl ResolutionStats {
    pub(crate) fn record_source(&self, source: ValueSource) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let counter = match source {
            ValueSource::Cache => &self.from_cache,
            ValueSource::Environment => &self.from_environment,
            ValueSource::Store => &self.from_store,
            ValueSource::Default => &self.from_default,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_found(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_caller_fallback(&self) {
        self.caller_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coercion_failure(&self) {
        self.coercion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_missing_schema(&self) {
        self.missing_schemas.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, accepted: bool) {
        let counter = if accepted { &self.writes } else { &self.rejected_writes };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolutionCounters {
        ResolutionCounters {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            from_cache: self.from_cache.load(Ordering::Relaxed),
            from_environment: self.from_environment.load(Ordering::Relaxed),
            from_store: self.from_store.load(Ordering::Relaxed),
            from_default: self.from_default.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            caller_fallbacks: self.caller_fallbacks.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            coercion_failures: self.coercion_failures.load(Ordering::Relaxed),
            missing_schemas: self.missing_schemas.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            rejected_writes: self.rejected_writes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ResolutionStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionCounters {
    pub resolutions: u64,
    pub from_cache: u64,
    pub from_environment: u64,
    pub from_store: u64,
    pub from_default: u64,
    pub not_found: u64,
    pub caller_fallbacks: u64,
    pub store_errors: u64,
    pub coercion_failures: u64,
    pub missing_schemas: u64,
    pub notifications: u64,
    pub writes: u64,
    pub rejected_writes: u64,
}

/// Everything a health endpoint or the CLI needs in one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub resolution: ResolutionCounters,
    pub cache: CacheStats,
    pub events: BusStats,
    pub pending_restarts: usize,
    pub validation_success_rate: f64,
    pub uptime_secs: u64,
}
