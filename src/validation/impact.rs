//! Change impact assessment.

use serde::Serialize;
use std::fmt;

use crate::registry::{Category, ConfigSchema, ConfigValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    /// Level implied by a relative change magnitude.
    pub fn from_relative_change(change: f64) -> Self {
        if change == 0.0 {
            ImpactLevel::None
        } else if change < 0.1 {
            ImpactLevel::Low
        } else if change < 0.5 {
            ImpactLevel::Medium
        } else if change < 2.0 {
            ImpactLevel::High
        } else {
            ImpactLevel::Critical
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactLevel::None => "none",
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactAssessment {
    pub key: String,
    pub level: ImpactLevel,
    /// `|new - old| / |old|` for numeric changes.
    pub relative_change: Option<f64>,
    pub affected_components: Vec<String>,
    pub requires_restart: bool,
    pub summary: String,
}

/// Estimate the blast radius of changing `key` from `old` to `new`.
///
/// Numeric changes are graded by relative magnitude, other changes count
/// as medium. The schema then raises the level: restart-bound and
/// security keys are at least high, and entering maintenance mode is
/// critical.
pub fn assess_impact(
    schema: Option<&ConfigSchema>,
    key: &str,
    old: Option<&ConfigValue>,
    new: &ConfigValue,
) -> ImpactAssessment {
    let mut relative_change = None;
    let mut level = match old {
        None => ImpactLevel::Medium,
        Some(old) if old == new => ImpactLevel::None,
        Some(old) => match (old.as_f64(), new.as_f64()) {
            (Some(a), Some(b)) if a == b => ImpactLevel::None,
            (Some(a), Some(_)) if a == 0.0 => {
                relative_change = Some(f64::INFINITY);
                ImpactLevel::High
            }
            (Some(a), Some(b)) => {
                let change = (b - a).abs() / a.abs();
                relative_change = Some(change);
                ImpactLevel::from_relative_change(change)
            }
            _ => ImpactLevel::Medium,
        },
    };

    let requires_restart = schema.map(|s| s.requires_restart).unwrap_or(false);
    if level > ImpactLevel::None {
        if let Some(schema) = schema {
            level = level.max(key_floor(schema, new));
        }
    }

    let affected_components = schema
        .map(|s| s.category.components().iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();

    let summary = match (level, requires_restart) {
        (ImpactLevel::None, _) => format!("{} is unchanged", key),
        (_, true) => format!("{} impact change to {}; takes effect after restart", level, key),
        (_, false) => format!("{} impact change to {}", level, key),
    };

    ImpactAssessment {
        key: key.to_string(),
        level,
        relative_change,
        affected_components,
        requires_restart: requires_restart && level > ImpactLevel::None,
        summary,
    }
}

fn key_floor(schema: &ConfigSchema, new: &ConfigValue) -> ImpactLevel {
    if schema.key == "maintenance_mode" && new.as_bool() == Some(true) {
        return ImpactLevel::Critical;
    }
    if schema.requires_restart || schema.category == Category::Security {
        return ImpactLevel::High;
    }
    ImpactLevel::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    fn assess(key: &str, old: ConfigValue, new: ConfigValue) -> ImpactAssessment {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.get(key);
        assess_impact(schema.as_deref(), key, Some(&old), &new)
    }

    #[test]
    fn test_relative_change_bands() {
        assert_eq!(ImpactLevel::from_relative_change(0.0), ImpactLevel::None);
        assert_eq!(ImpactLevel::from_relative_change(0.05), ImpactLevel::Low);
        assert_eq!(ImpactLevel::from_relative_change(0.2), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_relative_change(1.0), ImpactLevel::High);
        assert_eq!(ImpactLevel::from_relative_change(5.0), ImpactLevel::Critical);
    }

    #[test]
    fn test_numeric_change() {
        let a = assess("max_concurrent_jobs", ConfigValue::Integer(10), ConfigValue::Integer(12));
        assert_eq!(a.level, ImpactLevel::Medium);
        assert_eq!(a.relative_change, Some(0.2));
        assert_eq!(a.affected_components, vec!["task_scheduler", "job_queue"]);
        assert!(!a.requires_restart);
    }

    #[test]
    fn test_unchanged_value_is_none() {
        let a = assess("worker_pool_size", ConfigValue::Integer(4), ConfigValue::Integer(4));
        assert_eq!(a.level, ImpactLevel::None);
        assert!(!a.requires_restart);
    }

    #[test]
    fn test_restart_key_is_at_least_high() {
        let a = assess("worker_pool_size", ConfigValue::Integer(4), ConfigValue::Integer(5));
        assert_eq!(a.level, ImpactLevel::High);
        assert!(a.requires_restart);
    }

    #[test]
    fn test_entering_maintenance_is_critical() {
        let (off, on) = (ConfigValue::Boolean(false), ConfigValue::Boolean(true));
        let entering = assess("maintenance_mode", off.clone(), on.clone());
        assert_eq!(entering.level, ImpactLevel::Critical);
        let leaving = assess("maintenance_mode", on, off);
        assert_eq!(leaving.level, ImpactLevel::Medium);
    }

    #[test]
    fn test_unknown_key_without_schema() {
        let a = assess_impact(None, "custom", None, &ConfigValue::from("x"));
        assert_eq!(a.level, ImpactLevel::Medium);
        assert!(a.affected_components.is_empty());
    }
}
