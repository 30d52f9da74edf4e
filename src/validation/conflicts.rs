//! Cross-key conflict rules.
//!
//! Each rule is an independent predicate over a proposed configuration
//! set. A rule is only evaluated when every key it names is present and
//! numeric, so partial sets never produce spurious conflicts.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::registry::ConfigValue;

/// A full or partial proposed configuration.
pub type ConfigSet = HashMap<String, ConfigValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Warning,
    Error,
}

/// A detected violation of a cross-key rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub rule: &'static str,
    pub keys: Vec<String>,
    pub severity: ConflictSeverity,
    pub message: String,
}

impl Conflict {
    pub fn is_error(&self) -> bool {
        self.severity == ConflictSeverity::Error
    }

    pub fn involves(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

type Predicate = Box<dyn Fn(&[f64]) -> Option<String> + Send + Sync>;

/// A named predicate over the numeric values of `keys`, in order.
pub struct ConflictRule {
    pub name: &'static str,
    pub keys: &'static [&'static str],
    pub severity: ConflictSeverity,
    predicate: Predicate,
}

impl ConflictRule {
    pub fn new(
        name: &'static str,
        keys: &'static [&'static str],
        severity: ConflictSeverity,
        predicate: impl Fn(&[f64]) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            keys,
            severity,
            predicate: Box::new(predicate),
        }
    }

    /// Evaluate the rule, or `None` if a key is missing or non-numeric.
    pub fn check(&self, set: &ConfigSet) -> Option<Conflict> {
        let values: Option<Vec<f64>> = self
            .keys
            .iter()
            .map(|k| set.get(*k).and_then(ConfigValue::as_f64))
            .collect();
        let message = (self.predicate)(&values?)?;
        Some(Conflict {
            rule: self.name,
            keys: self.keys.iter().map(|k| k.to_string()).collect(),
            severity: self.severity,
            message,
        })
    }
}

impl fmt::Debug for ConflictRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictRule")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("severity", &self.severity)
            .finish()
    }
}

/// Rules for the built-in scheduler and rate-limiting keys.
pub fn default_rules(memory_ceiling_mb: i64) -> Vec<ConflictRule> {
    let ceiling = memory_ceiling_mb as f64;
    vec![
        ConflictRule::new(
            "concurrency_exceeds_queue",
            &["max_concurrent_jobs", "queue_size_limit"],
            ConflictSeverity::Error,
            |v| {
                (v[0] > v[1]).then(|| {
                    format!(
                        "max_concurrent_jobs ({}) exceeds queue_size_limit ({}); \
                         raise the queue limit or lower concurrency",
                        v[0], v[1]
                    )
                })
            },
        ),
        ConflictRule::new(
            "memory_exceeds_ceiling",
            &["memory_per_job_mb", "max_concurrent_jobs"],
            ConflictSeverity::Warning,
            move |v| {
                let total = v[0] * v[1];
                (total > ceiling).then(|| {
                    format!(
                        "memory_per_job_mb × max_concurrent_jobs = {} MB exceeds the {} MB ceiling",
                        total, ceiling
                    )
                })
            },
        ),
        ConflictRule::new(
            "burst_exceeds_rate",
            &["rate_limit_burst", "rate_limit_requests_per_minute"],
            ConflictSeverity::Error,
            |v| {
                (v[0] > v[1]).then(|| {
                    format!(
                        "rate_limit_burst ({}) exceeds rate_limit_requests_per_minute ({})",
                        v[0], v[1]
                    )
                })
            },
        ),
        ConflictRule::new(
            "workers_exceed_concurrency",
            &["worker_pool_size", "max_concurrent_jobs"],
            ConflictSeverity::Warning,
            |v| {
                (v[0] > v[1]).then(|| {
                    format!(
                        "worker_pool_size ({}) exceeds max_concurrent_jobs ({}); \
                         extra workers stay idle",
                        v[0], v[1]
                    )
                })
            },
        ),
    ]
}

/// Run every rule over `set`.
pub fn detect_conflicts(rules: &[ConflictRule], set: &ConfigSet) -> Vec<Conflict> {
    rules.iter().filter_map(|rule| rule.check(set)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, i64)]) -> ConfigSet {
        pairs.iter().map(|(k, v)| (k.to_string(), ConfigValue::Integer(*v))).collect()
    }

    #[test]
    fn test_concurrency_over_queue_is_error() {
        let rules = default_rules(16_384);
        let conflicts = detect_conflicts(
            &rules,
            &set(&[("max_concurrent_jobs", 20), ("queue_size_limit", 10)]),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule, "concurrency_exceeds_queue");
        assert!(conflicts[0].is_error());
        assert!(conflicts[0].involves("queue_size_limit"));
    }

    #[test]
    fn test_consistent_set_has_no_conflicts() {
        let rules = default_rules(16_384);
        let conflicts = detect_conflicts(
            &rules,
            &set(&[("max_concurrent_jobs", 5), ("queue_size_limit", 50)]),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_memory_ceiling_is_warning() {
        let rules = default_rules(1_024);
        let conflicts = detect_conflicts(
            &rules,
            &set(&[
                ("max_concurrent_jobs", 8),
                ("queue_size_limit", 100),
                ("memory_per_job_mb", 256),
            ]),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Warning);
        assert!(conflicts[0].message.contains("2048"));
    }

    #[test]
    fn test_missing_or_non_numeric_keys_skip_rule() {
        let rules = default_rules(16_384);
        let mut partial = set(&[("max_concurrent_jobs", 50)]);
        assert!(detect_conflicts(&rules, &partial).is_empty());

        partial.insert("queue_size_limit".into(), ConfigValue::from("ten"));
        assert!(detect_conflicts(&rules, &partial).is_empty());
    }

    #[test]
    fn test_burst_over_rate() {
        let rules = default_rules(16_384);
        let conflicts = detect_conflicts(
            &rules,
            &set(&[("rate_limit_burst", 100), ("rate_limit_requests_per_minute", 60)]),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule, "burst_exceeds_rate");
    }
}
