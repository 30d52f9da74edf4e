//! Service settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One semantic problem with the service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn check(
    errors: &mut Vec<ValidationError>,
    ok: bool,
    field: &'static str,
    message: impl Into<String>,
) {
    if !ok {
        errors.push(ValidationError {
            field,
            message: message.into(),
        });
    }
}

/// Check every setting, collecting all failures.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check(
        &mut errors,
        config.cache.max_entries > 0,
        "cache.max_entries",
        "must be greater than 0",
    );
    check(
        &mut errors,
        config.cache.max_memory_bytes > 0,
        "cache.max_memory_bytes",
        "must be greater than 0",
    );
    check(
        &mut errors,
        config.cache.default_ttl_secs > 0,
        "cache.default_ttl_secs",
        "must be greater than 0",
    );
    check(
        &mut errors,
        config.cache.cleanup_interval_secs > 0,
        "cache.cleanup_interval_secs",
        "must be greater than 0",
    );

    check(
        &mut errors,
        config.event_bus.queue_capacity > 0,
        "event_bus.queue_capacity",
        "must be greater than 0",
    );
    check(
        &mut errors,
        config.event_bus.subscriber_queue_capacity > 0,
        "event_bus.subscriber_queue_capacity",
        "must be greater than 0",
    );
    check(
        &mut errors,
        config.event_bus.callback_timeout_ms > 0,
        "event_bus.callback_timeout_ms",
        "must be greater than 0",
    );

    let prefix = &config.resolution.env_prefix;
    check(
        &mut errors,
        !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "resolution.env_prefix",
        format!("'{}' must be non-empty and contain only A-Z, 0-9 or '_'", prefix),
    );

    check(
        &mut errors,
        config.validation.history_window > 0,
        "validation.history_window",
        "must be greater than 0",
    );
    check(
        &mut errors,
        (0.0..=1.0).contains(&config.validation.fallback_threshold),
        "validation.fallback_threshold",
        "must be between 0.0 and 1.0",
    );
    check(
        &mut errors,
        config.validation.memory_ceiling_mb > 0,
        "validation.memory_ceiling_mb",
        "must be greater than 0",
    );

    check(
        &mut errors,
        config.lifecycle.shutdown_timeout_ms > 0,
        "lifecycle.shutdown_timeout_ms",
        "must be greater than 0",
    );

    let level = config.observability.log_level.to_ascii_lowercase();
    check(
        &mut errors,
        LOG_LEVELS.contains(&level.as_str()),
        "observability.log_level",
        format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
    );
    if config.observability.metrics_enabled {
        check(
            &mut errors,
            config.observability.metrics_address.parse::<SocketAddr>().is_ok(),
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
