//! Restart requirement bookkeeping.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::registry::{Category, ConfigSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// A changed key whose new value only takes effect after a restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartRequirement {
    pub key: String,
    pub reason: String,
    /// Component that must be restarted.
    pub component: String,
    pub priority: RestartPriority,
    /// Components that depend on `component` and restart with it.
    pub dependencies: Vec<String>,
    pub added_at: SystemTime,
}

impl RestartRequirement {
    pub fn for_schema(schema: &ConfigSchema, reason: impl Into<String>) -> Self {
        let components = schema.category.components();
        let priority = match schema.category {
            Category::Security => RestartPriority::Critical,
            Category::System => RestartPriority::High,
            _ => RestartPriority::Medium,
        };
        Self {
            key: schema.key.clone(),
            reason: reason.into(),
            component: components.first().map(|c| c.to_string()).unwrap_or_default(),
            priority,
            dependencies: components.iter().skip(1).map(|c| c.to_string()).collect(),
            added_at: SystemTime::now(),
        }
    }
}

/// Pending restart requirements, one per key.
#[derive(Debug, Default)]
pub struct RestartTracker {
    pending: Mutex<BTreeMap<String, RestartRequirement>>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a requirement. Returns true if the key was not already pending;
    /// an existing entry keeps its original `added_at`.
    pub fn add(&self, requirement: RestartRequirement) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        match pending.get_mut(&requirement.key) {
            Some(existing) => {
                existing.reason = requirement.reason;
                false
            }
            None => {
                pending.insert(requirement.key.clone(), requirement);
                true
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).remove(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn is_required(&self) -> bool {
        !self.pending.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending keys in sorted order.
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect()
    }

    /// Requirements, highest priority first.
    pub fn requirements(&self) -> Vec<RestartRequirement> {
        let mut all: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.key.cmp(&b.key)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    #[test]
    fn test_add_is_idempotent_per_key() {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.get("worker_pool_size").unwrap();
        let tracker = RestartTracker::new();

        assert!(tracker.add(RestartRequirement::for_schema(&schema, "resized")));
        assert!(!tracker.add(RestartRequirement::for_schema(&schema, "resized again")));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.requirements()[0].reason, "resized again");
        assert_eq!(tracker.requirements()[0].component, "task_scheduler");
        assert_eq!(tracker.requirements()[0].dependencies, vec!["job_queue"]);
    }

    #[test]
    fn test_priority_ordering_and_clear() {
        let registry = SchemaRegistry::with_defaults();
        let tracker = RestartTracker::new();
        for key in ["worker_pool_size", "database_pool_size", "api_secret_key"] {
            tracker.add(RestartRequirement::for_schema(&registry.get(key).unwrap(), "changed"));
        }

        let order: Vec<_> = tracker.requirements().into_iter().map(|r| r.key).collect();
        assert_eq!(order, vec!["api_secret_key", "database_pool_size", "worker_pool_size"]);
        assert_eq!(
            tracker.pending_keys(),
            vec!["api_secret_key", "database_pool_size", "worker_pool_size"]
        );

        assert!(tracker.remove("api_secret_key"));
        assert!(!tracker.remove("api_secret_key"));
        assert_eq!(tracker.clear(), 2);
        assert!(!tracker.is_required());
    }
}
