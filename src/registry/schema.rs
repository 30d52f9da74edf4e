//! Schema definitions and the key-indexed schema registry.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::value::{ConfigValue, ValueType};

/// Functional area a key belongs to. Drives impact assessment and
/// restart bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Scheduler,
    Alerting,
    RateLimiting,
    Session,
    Feature,
    Security,
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Scheduler => "scheduler",
            Category::Alerting => "alerting",
            Category::RateLimiting => "rate_limiting",
            Category::Session => "session",
            Category::Feature => "feature",
            Category::Security => "security",
            Category::System => "system",
        }
    }

    /// Downstream components that consume keys of this category.
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            Category::Scheduler => &["task_scheduler", "job_queue"],
            Category::Alerting => &["alert_manager"],
            Category::RateLimiting => &["rate_limiter"],
            Category::Session => &["session_manager"],
            Category::Feature => &["feature_flags"],
            Category::Security => &["auth", "session_manager"],
            Category::System => &[
                "task_scheduler",
                "alert_manager",
                "rate_limiter",
                "session_manager",
            ],
        }
    }
}

/// A compiled `pattern` rule. Serializes as its source text.
#[derive(Debug, Clone)]
pub struct RulePattern(Regex);

impl RulePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Serialize for RulePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

/// Hard and soft constraints for a single key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationRules {
    /// Inclusive hard lower bound (numeric types).
    pub min: Option<f64>,
    /// Inclusive hard upper bound (numeric types).
    pub max: Option<f64>,
    /// Closed set of acceptable values. Empty means unrestricted.
    pub allowed_values: Vec<ConfigValue>,
    pub pattern: Option<RulePattern>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Soft bounds; violations only produce warnings.
    pub recommended_min: Option<f64>,
    pub recommended_max: Option<f64>,
}

/// Static description of a configuration key.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSchema {
    pub key: String,
    pub value_type: ValueType,
    pub category: Category,
    pub default_value: Option<ConfigValue>,
    pub rules: ValidationRules,
    pub sensitive: bool,
    pub allow_env_override: bool,
    pub requires_restart: bool,
    pub description: String,
    /// Overrides the cache's default TTL for this key.
    pub cache_ttl: Option<Duration>,
}

impl ConfigSchema {
    pub fn new(key: impl Into<String>, value_type: ValueType, category: Category) -> Self {
        Self {
            key: key.into(),
            value_type,
            category,
            default_value: None,
            rules: ValidationRules::default(),
            sensitive: false,
            allow_env_override: true,
            requires_restart: false,
            description: String::new(),
            cache_ttl: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.rules.min = Some(min);
        self.rules.max = Some(max);
        self
    }

    pub fn with_recommended(mut self, min: f64, max: f64) -> Self {
        self.rules.recommended_min = Some(min);
        self.rules.recommended_max = Some(max);
        self
    }

    pub fn with_allowed<V: Into<ConfigValue>>(
        mut self,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.rules.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.rules.min_length = min;
        self.rules.max_length = max;
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.pattern = Some(RulePattern::new(pattern)?);
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn no_env_override(mut self) -> Self {
        self.allow_env_override = false;
        self
    }

    pub fn restart_required(mut self) -> Self {
        self.requires_restart = true;
        self
    }

    /// Render a value for logs and CLI output, masking sensitive keys.
    pub fn redact(&self, value: &ConfigValue) -> String {
        if self.sensitive {
            "***".to_string()
        } else {
            value.to_raw_string()
        }
    }
}

/// Key-indexed schema table.
///
/// Built once and then shared behind an `Arc`; services never mutate it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ConfigSchema>>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in catalog.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for schema in crate::registry::defaults::builtin_schemas() {
            registry.register(schema);
        }
        registry
    }

    /// Register a schema, returning the one it replaced.
    pub fn register(&mut self, schema: ConfigSchema) -> Option<Arc<ConfigSchema>> {
        self.schemas.insert(schema.key.clone(), Arc::new(schema))
    }

    pub fn get(&self, key: &str) -> Option<Arc<ConfigSchema>> {
        self.schemas.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.schemas.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ConfigSchema>> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Every non-null schema default.
    pub fn defaults(&self) -> HashMap<String, ConfigValue> {
        self.schemas
            .values()
            .filter_map(|s| s.default_value.clone().map(|v| (s.key.clone(), v)))
            .collect()
    }
}
