//! Built-in schema catalog for the job scheduler, alerting, rate limiting
//! and session subsystems.

use std::time::Duration;

use crate::registry::schema::{Category, ConfigSchema};
use crate::registry::value::ValueType;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// All built-in schemas.
pub fn builtin_schemas() -> Vec<ConfigSchema> {
    vec![
        // Scheduler
        ConfigSchema::new("max_concurrent_jobs", ValueType::Integer, Category::Scheduler)
            .with_default(10i64)
            .with_range(1.0, 1000.0)
            .with_recommended(1.0, 100.0)
            .with_description("Maximum number of jobs executing at once"),
        ConfigSchema::new("queue_size_limit", ValueType::Integer, Category::Scheduler)
            .with_default(100i64)
            .with_range(1.0, 100_000.0)
            .with_recommended(10.0, 10_000.0)
            .with_description("Maximum number of jobs waiting in the queue"),
        ConfigSchema::new("job_timeout_seconds", ValueType::Integer, Category::Scheduler)
            .with_default(300i64)
            .with_range(1.0, 86_400.0)
            .with_recommended(30.0, 3_600.0)
            .with_description("Wall-clock budget for a single job"),
        ConfigSchema::new("memory_per_job_mb", ValueType::Integer, Category::Scheduler)
            .with_default(256i64)
            .with_range(16.0, 65_536.0)
            .with_recommended(64.0, 4_096.0)
            .with_description("Memory reserved for each running job"),
        ConfigSchema::new("worker_pool_size", ValueType::Integer, Category::Scheduler)
            .with_default(4i64)
            .with_range(1.0, 256.0)
            .restart_required()
            .with_description("Number of worker threads; read once at startup"),
        ConfigSchema::new("database_pool_size", ValueType::Integer, Category::System)
            .with_default(10i64)
            .with_range(1.0, 500.0)
            .with_recommended(2.0, 100.0)
            .restart_required()
            .with_description("Connections held by the database pool"),
        // Alerting
        ConfigSchema::new("job_failure_rate_threshold", ValueType::Float, Category::Alerting)
            .with_default(0.1)
            .with_range(0.0, 1.0)
            .with_recommended(0.01, 0.5)
            .with_description("Failure ratio above which an alert fires"),
        ConfigSchema::new("alert_cooldown_minutes", ValueType::Integer, Category::Alerting)
            .with_default(15i64)
            .with_range(0.0, 1_440.0)
            .with_recommended(1.0, 120.0)
            .with_description("Minimum delay between repeated alerts"),
        // Rate limiting
        ConfigSchema::new(
            "rate_limit_requests_per_minute",
            ValueType::Integer,
            Category::RateLimiting,
        )
            .with_default(60i64)
            .with_range(1.0, 100_000.0)
            .with_description("Sustained request rate per client")
            .with_cache_ttl(Duration::from_secs(60)),
        ConfigSchema::new("rate_limit_burst", ValueType::Integer, Category::RateLimiting)
            .with_default(10i64)
            .with_range(1.0, 10_000.0)
            .with_description("Requests a client may issue above the sustained rate")
            .with_cache_ttl(Duration::from_secs(60)),
        // Session
        ConfigSchema::new("session_timeout_minutes", ValueType::Integer, Category::Session)
            .with_default(30i64)
            .with_range(1.0, 10_080.0)
            .with_recommended(5.0, 720.0)
            .with_description("Idle time before a session expires"),
        // System
        ConfigSchema::new("log_level", ValueType::String, Category::System)
            .with_default("info")
            .with_allowed(["trace", "debug", "info", "warn", "error"])
            .with_description("Minimum log level emitted by services"),
        ConfigSchema::new("maintenance_mode", ValueType::Boolean, Category::System)
            .with_default(false)
            .with_description("Reject new work while maintenance is in progress"),
        // Features
        ConfigSchema::new("feature_flags", ValueType::Json, Category::Feature)
            .with_default(serde_json::json!({}))
            .with_description("Free-form feature toggles"),
        // Security
        ConfigSchema::new("api_secret_key", ValueType::String, Category::Security)
            .with_length(Some(32), Some(256))
            .sensitive()
            .no_env_override()
            .restart_required()
            .with_description("Shared secret used to sign API tokens"),
        admin_email_schema(),
    ]
}

fn admin_email_schema() -> ConfigSchema {
    let schema = ConfigSchema::new("admin_email", ValueType::String, Category::Alerting)
        .with_length(Some(3), Some(254))
        .with_description("Recipient for operational alerts");
    match schema.clone().with_pattern(EMAIL_PATTERN) {
        Ok(schema) => schema,
        Err(e) => {
            tracing::warn!(error = %e, "Email pattern failed to compile; admin_email is unchecked");
            schema
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    #[test]
    fn test_catalog_keys_are_unique() {
        let schemas = builtin_schemas();
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(schemas.len(), registry.len());
    }

    #[test]
    fn test_defaults_respect_hard_ranges() {
        for schema in builtin_schemas() {
            let (Some(default), Some(min), Some(max)) =
                (schema.default_value.as_ref(), schema.rules.min, schema.rules.max)
            else {
                continue;
            };
            let n = default.as_f64().unwrap();
            assert!(
                n >= min && n <= max,
                "{} default {} outside [{}, {}]",
                schema.key,
                n,
                min,
                max
            );
        }
    }

    #[test]
    fn test_email_pattern_compiles() {
        let schema = admin_email_schema();
        let pattern = schema.rules.pattern.unwrap();
        assert!(pattern.is_match("ops@example.com"));
        assert!(!pattern.is_match("not-an-email"));
    }
}
