//! Per-value validation outcome.

use serde::Serialize;

use crate::registry::ConfigValue;

/// Result of validating one value against its schema.
///
/// `errors` make the value unacceptable; `warnings` are advisory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub key: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    /// A corrected value the caller may use instead (clamped or default).
    pub suggested_value: Option<ConfigValue>,
    /// The value after coercion to the declared type, when coercion succeeded.
    pub coerced_value: Option<ConfigValue>,
}

impl ValidationReport {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn suggest(&mut self, suggestion: impl Into<String>) {
        self.suggestions.push(suggestion.into());
    }

    /// Keep the first suggested value; later checks do not override it.
    pub fn suggest_value(&mut self, value: ConfigValue) {
        if self.suggested_value.is_none() {
            self.suggested_value = Some(value);
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
