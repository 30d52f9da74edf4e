//! Schema-driven value validation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::config::ValidationConfig;
use crate::registry::{ConfigSchema, ConfigValue, SchemaRegistry, ValueType};
use crate::validation::conflicts::{
    default_rules, detect_conflicts, ConfigSet, Conflict, ConflictRule,
};
use crate::validation::fallback::registered_safe_values;
use crate::validation::impact::{assess_impact, ImpactAssessment};
use crate::validation::report::ValidationReport;

/// Validates values, detects cross-key conflicts and tracks recent outcomes.
pub struct ConfigValidator {
    schemas: Arc<SchemaRegistry>,
    rules: Vec<ConflictRule>,
    /// Outcomes of the most recent validations, newest last.
    history: Mutex<VecDeque<bool>>,
    history_window: usize,
    fallback_threshold: f64,
}

impl ConfigValidator {
    pub fn new(schemas: Arc<SchemaRegistry>, config: &ValidationConfig) -> Self {
        Self::with_rules(schemas, config, default_rules(config.memory_ceiling_mb))
    }

    pub fn with_rules(
        schemas: Arc<SchemaRegistry>,
        config: &ValidationConfig,
        rules: Vec<ConflictRule>,
    ) -> Self {
        Self {
            schemas,
            rules,
            history: Mutex::new(VecDeque::with_capacity(config.history_window)),
            history_window: config.history_window.max(1),
            fallback_threshold: config.fallback_threshold,
        }
    }

    /// Validate `value` for a registered key. Unknown keys are invalid.
    pub fn validate(&self, key: &str, value: &ConfigValue) -> ValidationReport {
        match self.schemas.get(key) {
            Some(schema) => self.validate_value(key, value, &schema),
            None => {
                let mut report = ValidationReport::new(key);
                report.error(format!("no schema registered for {}", key));
                self.record(false);
                report
            }
        }
    }

    /// Validate `value` against `schema` and record the outcome.
    ///
    /// Checks run in order: coercion, hard rules, then recommended range.
    /// A coercion failure stops further checks; recommended-range warnings
    /// are only produced for values that pass every hard rule.
    pub fn validate_value(
        &self,
        key: &str,
        value: &ConfigValue,
        schema: &ConfigSchema,
    ) -> ValidationReport {
        let report = check_value(key, value, schema);
        self.record(report.is_valid);
        if !report.is_valid {
            tracing::debug!(key = %key, errors = ?report.errors, "Validation failed");
        }
        report
    }

    pub fn detect_conflicts(&self, set: &ConfigSet) -> Vec<Conflict> {
        detect_conflicts(&self.rules, set)
    }

    pub fn assess_impact(
        &self,
        key: &str,
        old: Option<&ConfigValue>,
        new: &ConfigValue,
    ) -> ImpactAssessment {
        let schema = self.schemas.get(key);
        assess_impact(schema.as_deref(), key, old, new)
    }

    /// The conservative fallback set, restricted to values that pass their schema.
    pub fn safe_fallback(&self) -> BTreeMap<String, ConfigValue> {
        let mut values = registered_safe_values(&self.schemas);
        values.retain(|key, value| match self.schemas.get(key) {
            Some(schema) => {
                let report = check_value(key, value, &schema);
                if !report.is_valid {
                    tracing::warn!(
                        key = %key,
                        errors = ?report.errors,
                        "Safe fallback value rejected by schema"
                    );
                }
                report.is_valid
            }
            None => false,
        });
        values
    }

    /// Share of valid results among the recent window. 1.0 with no history.
    pub fn success_rate(&self) -> f64 {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        if history.is_empty() {
            return 1.0;
        }
        history.iter().filter(|ok| **ok).count() as f64 / history.len() as f64
    }

    /// True when recent validations mostly fail.
    pub fn should_use_safe_fallback(&self) -> bool {
        self.success_rate() < self.fallback_threshold
    }

    fn record(&self, ok: bool) {
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        if history.len() == self.history_window {
            history.pop_front();
        }
        history.push_back(ok);
    }
}

fn check_value(key: &str, value: &ConfigValue, schema: &ConfigSchema) -> ValidationReport {
    let mut report = ValidationReport::new(key);

    let coerced = match schema.value_type.coerce(value) {
        Ok(v) => v,
        Err(e) => {
            report.error(format!("type error: expected {}, {}", schema.value_type, e.reason));
            report.suggest(format!("provide a {} value", schema.value_type));
            if let Some(default) = &schema.default_value {
                report.suggest_value(default.clone());
            }
            return report;
        }
    };

    let rules = &schema.rules;
    let shown = schema.redact(&coerced);

    match numeric(&coerced) {
        Some(n) if !n.is_finite() => {
            report.error(format!("{} is not a finite number", shown));
            report.suggest("use a finite number");
            if let Some(default) = &schema.default_value {
                report.suggest_value(default.clone());
            }
        }
        Some(n) => check_range(&mut report, n, &shown, schema),
        None => {}
    }

    if !rules.allowed_values.is_empty() && !rules.allowed_values.contains(&coerced) {
        let allowed: Vec<String> = rules.allowed_values.iter().map(|v| v.to_raw_string()).collect();
        report.error(format!("{} is not one of [{}]", shown, allowed.join(", ")));
        if let Some(first) = rules.allowed_values.first() {
            report.suggest_value(first.clone());
        }
    }

    if let ConfigValue::String(s) = &coerced {
        if let Some(pattern) = &rules.pattern {
            if !pattern.is_match(s) {
                report.error(format!("{} does not match the pattern {}", shown, pattern.as_str()));
            }
        }
        let len = s.chars().count();
        if let Some(min_len) = rules.min_length {
            if len < min_len {
                report.error(format!("length {} is shorter than {}", len, min_len));
            }
        }
        if let Some(max_len) = rules.max_length {
            if len > max_len {
                report.error(format!("length {} is longer than {}", len, max_len));
            }
        }
    }

    if report.is_valid {
        if let Some(n) = numeric(&coerced) {
            if let Some(low) = rules.recommended_min {
                if n < low {
                    report.warning(format!("{} is below the recommended minimum {}", shown, low));
                    report.suggest_value(numeric_value(schema.value_type, low));
                }
            }
            if let Some(high) = rules.recommended_max {
                if n > high {
                    report.warning(format!("{} is above the recommended maximum {}", shown, high));
                    report.suggest_value(numeric_value(schema.value_type, high));
                }
            }
        }
        report.coerced_value = Some(coerced);
    }

    report
}

fn check_range(report: &mut ValidationReport, n: f64, shown: &str, schema: &ConfigSchema) {
    let rules = &schema.rules;
    if let Some(min) = rules.min {
        if n < min {
            report.error(format!("{} is below the minimum {}", shown, min));
            report.suggest(format!("use a value of at least {}", min));
            report.suggest_value(numeric_value(schema.value_type, min));
        }
    }
    if let Some(max) = rules.max {
        if n > max {
            report.error(format!("{} is above the maximum {}", shown, max));
            report.suggest(format!("use a value of at most {}", max));
            report.suggest_value(numeric_value(schema.value_type, max));
        }
    }
}

fn numeric(value: &ConfigValue) -> Option<f64> {
    match value {
        ConfigValue::Integer(_) | ConfigValue::Float(_) => value.as_f64(),
        _ => None,
    }
}

fn numeric_value(value_type: ValueType, n: f64) -> ConfigValue {
    match value_type {
        ValueType::Integer => ConfigValue::Integer(n.round() as i64),
        _ => ConfigValue::Float(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ConfigValidator {
        ConfigValidator::new(
            Arc::new(SchemaRegistry::with_defaults()),
            &ValidationConfig::default(),
        )
    }

    #[test]
    fn test_out_of_range_float() {
        let v = validator();
        let report = v.validate("job_failure_rate_threshold", &ConfigValue::Float(1.5));
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.suggested_value, Some(ConfigValue::Float(1.0)));
        assert!(report.coerced_value.is_none());
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let v = validator();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let report = v.validate("job_failure_rate_threshold", &ConfigValue::Float(value));
            assert!(!report.is_valid, "{} accepted", value);
            assert_eq!(report.errors.len(), 1);
            assert!(report.errors[0].contains("not a finite number"));
            assert_eq!(report.suggested_value, Some(ConfigValue::Float(0.1)));
            assert!(report.coerced_value.is_none());
        }

        let report = v.validate("job_failure_rate_threshold", &ConfigValue::from("NaN"));
        assert!(!report.is_valid);
    }

    #[test]
    fn test_integer_accepted_for_float_key() {
        let report = validator().validate("job_failure_rate_threshold", &ConfigValue::Integer(0));
        assert!(report.is_valid);
        assert_eq!(report.coerced_value, Some(ConfigValue::Float(0.0)));
        // 0.0 is below the recommended minimum 0.01.
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_coercion_failure_stops_checks() {
        let report = validator().validate("max_concurrent_jobs", &ConfigValue::from("lots"));
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("type error"));
        assert_eq!(report.suggested_value, Some(ConfigValue::Integer(10)));
    }

    #[test]
    fn test_recommended_range_warns_only() {
        let report = validator().validate("max_concurrent_jobs", &ConfigValue::Integer(500));
        assert!(report.is_valid);
        assert!(report.has_warnings());
        assert_eq!(report.suggested_value, Some(ConfigValue::Integer(100)));
    }

    #[test]
    fn test_allowed_values_and_pattern() {
        let v = validator();
        let report = v.validate("log_level", &ConfigValue::from("verbose"));
        assert!(!report.is_valid);
        assert_eq!(report.suggested_value, Some(ConfigValue::from("trace")));

        assert!(v.validate("admin_email", &ConfigValue::from("ops@example.com")).is_valid);
        assert!(!v.validate("admin_email", &ConfigValue::from("nobody")).is_valid);
    }

    #[test]
    fn test_sensitive_values_are_not_echoed() {
        let report = validator().validate("api_secret_key", &ConfigValue::from("tiny-key"));
        assert!(!report.is_valid);
        assert!(report.errors.iter().all(|e| !e.contains("tiny-key")));
    }

    #[test]
    fn test_unknown_key_is_invalid() {
        let report = validator().validate("no_such_key", &ConfigValue::Integer(1));
        assert!(!report.is_valid);
    }

    #[test]
    fn test_success_rate_window() {
        let v = ConfigValidator::new(
            Arc::new(SchemaRegistry::with_defaults()),
            &ValidationConfig {
                history_window: 4,
                ..ValidationConfig::default()
            },
        );
        assert_eq!(v.success_rate(), 1.0);
        assert!(!v.should_use_safe_fallback());

        for _ in 0..3 {
            v.validate("max_concurrent_jobs", &ConfigValue::Integer(0));
        }
        v.validate("max_concurrent_jobs", &ConfigValue::Integer(5));
        assert_eq!(v.success_rate(), 0.25);
        assert!(v.should_use_safe_fallback());

        // Old failures age out of the window.
        for _ in 0..4 {
            v.validate("max_concurrent_jobs", &ConfigValue::Integer(5));
        }
        assert_eq!(v.success_rate(), 1.0);
    }

    #[test]
    fn test_safe_fallback_is_valid_and_consistent() {
        let v = validator();
        let fallback = v.safe_fallback();
        assert_eq!(fallback.get("max_concurrent_jobs"), Some(&ConfigValue::Integer(5)));

        let set: ConfigSet = fallback.into_iter().collect();
        assert!(v.detect_conflicts(&set).is_empty());
        // Fallback checks do not count towards the success rate.
        assert_eq!(v.success_rate(), 1.0);
    }
}
