//! Service settings definitions.
//!
//! This module defines the settings of the configuration service itself
//! (cache sizing, bus queues, environment prefix). All types derive Serde
//! traits for deserialization from a TOML file.

use serde::{Deserialize, Serialize};

/// Root settings for a [`ConfigService`](crate::resolution::ConfigService).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Resolution cache sizing and expiry.
    pub cache: CacheConfig,

    /// Event bus queues and callback budget.
    pub event_bus: EventBusConfig,

    /// Fallback chain settings.
    pub resolution: ResolutionConfig,

    /// Validator settings.
    pub validation: ValidationConfig,

    /// File-backed store used by the binaries.
    pub store: StoreConfig,

    /// Shutdown behaviour.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached keys.
    pub max_entries: usize,

    /// Soft memory ceiling for the heuristic estimate, in bytes.
    pub max_memory_bytes: usize,

    /// TTL applied when a schema does not override it, in seconds.
    pub default_ttl_secs: u64,

    /// Interval of the background expiry sweep, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_memory_bytes: 10 * 1024 * 1024, // 10MB
            default_ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Capacity of the publish queue; a full queue rejects new events.
    pub queue_capacity: usize,

    /// Events buffered per subscription; when full, that subscriber misses events.
    pub subscriber_queue_capacity: usize,

    /// Budget for a single callback invocation, in milliseconds.
    pub callback_timeout_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000,
            subscriber_queue_capacity: 256,
            callback_timeout_ms: 5_000,
        }
    }
}

/// Fallback chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Prefix for environment overrides (`<prefix>_<KEY>`).
    pub env_prefix: String,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            env_prefix: "DYNCONF".to_string(),
        }
    }
}

/// Validator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of recent validations tracked for the success rate.
    pub history_window: usize,

    /// Success rate below which the safe fallback is preferred.
    pub fallback_threshold: f64,

    /// Memory available to jobs, in MB; used by the memory conflict rule.
    pub memory_ceiling_mb: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            history_window: 100,
            fallback_threshold: 0.5,
            memory_ceiling_mb: 16_384,
        }
    }
}

/// File-backed store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the TOML value file.
    pub path: String,

    /// Reload the file and notify subscribers on external edits.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "dynconf-values.toml".to_string(),
            watch: true,
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Bound on draining background tasks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
