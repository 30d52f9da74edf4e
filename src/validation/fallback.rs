//! Conservative fallback configuration.

use std::collections::BTreeMap;

use crate::registry::{ConfigValue, SchemaRegistry};

/// Values known to keep every subsystem running at reduced capacity.
const SAFE_VALUES: &[(&str, SafeValue)] = &[
    ("max_concurrent_jobs", SafeValue::Int(5)),
    ("queue_size_limit", SafeValue::Int(50)),
    ("job_timeout_seconds", SafeValue::Int(300)),
    ("memory_per_job_mb", SafeValue::Int(256)),
    ("worker_pool_size", SafeValue::Int(2)),
    ("job_failure_rate_threshold", SafeValue::Float(0.1)),
    ("alert_cooldown_minutes", SafeValue::Int(30)),
    ("rate_limit_requests_per_minute", SafeValue::Int(30)),
    ("rate_limit_burst", SafeValue::Int(5)),
    ("session_timeout_minutes", SafeValue::Int(15)),
    ("log_level", SafeValue::Str("info")),
    ("maintenance_mode", SafeValue::Bool(false)),
];

#[derive(Debug, Clone, Copy)]
enum SafeValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(&'static str),
}

impl From<SafeValue> for ConfigValue {
    fn from(value: SafeValue) -> Self {
        match value {
            SafeValue::Int(i) => ConfigValue::Integer(i),
            SafeValue::Float(f) => ConfigValue::Float(f),
            SafeValue::Bool(b) => ConfigValue::Boolean(b),
            SafeValue::Str(s) => ConfigValue::String(s.to_string()),
        }
    }
}

/// The hard-coded safe set, before validation.
pub fn safe_values() -> BTreeMap<String, ConfigValue> {
    SAFE_VALUES
        .iter()
        .map(|(key, value)| (key.to_string(), ConfigValue::from(*value)))
        .collect()
}

/// Keep only the safe values whose key is registered.
pub(crate) fn registered_safe_values(schemas: &SchemaRegistry) -> BTreeMap<String, ConfigValue> {
    let mut values = safe_values();
    values.retain(|key, _| {
        let known = schemas.contains(key);
        if !known {
            tracing::debug!(key = %key, "Safe fallback key has no schema, skipping");
        }
        known
    });
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_values_are_registered() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(registered_safe_values(&registry).len(), SAFE_VALUES.len());
        assert!(registered_safe_values(&SchemaRegistry::new()).is_empty());
    }
}
