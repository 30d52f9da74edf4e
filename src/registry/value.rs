//! Typed configuration values and explicit coercion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoercionError;

/// Declared type of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Json => "json",
        }
    }

    /// Parse a raw string (environment variable, store column, CLI argument)
    /// into a value of this type.
    pub fn parse(&self, raw: &str) -> Result<ConfigValue, CoercionError> {
        let trimmed = raw.trim();
        match self {
            ValueType::String => Ok(ConfigValue::String(raw.to_string())),
            ValueType::Integer => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(ConfigValue::Integer(i));
                }
                // Accept "5.0" but not "5.5".
                match trimmed.parse::<f64>() {
                    Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(ConfigValue::Integer(f as i64))
                    }
                    _ => Err(self.error(raw, "not an integer")),
                }
            }
            ValueType::Float => match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(ConfigValue::Float(f)),
                Ok(_) => Err(self.error(raw, "not a finite number")),
                Err(e) => Err(self.error(raw, &e.to_string())),
            },
            ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(ConfigValue::Boolean(true)),
                "false" | "0" | "no" | "off" => Ok(ConfigValue::Boolean(false)),
                _ => Err(self.error(raw, "expected true/false, yes/no, on/off or 1/0")),
            },
            ValueType::Json => serde_json::from_str(trimmed)
                .map(ConfigValue::Json)
                .map_err(|e| self.error(raw, &e.to_string())),
        }
    }

    /// Convert an already-typed value into this type.
    pub fn coerce(&self, value: &ConfigValue) -> Result<ConfigValue, CoercionError> {
        if value.value_type() == *self {
            return Ok(value.clone());
        }
        match (self, value) {
            (ValueType::Float, ConfigValue::Integer(i)) => Ok(ConfigValue::Float(*i as f64)),
            (ValueType::Json, ConfigValue::Integer(i)) => Ok(ConfigValue::Json((*i).into())),
            (ValueType::Json, ConfigValue::Boolean(b)) => Ok(ConfigValue::Json((*b).into())),
            (ValueType::Json, ConfigValue::Float(f)) => serde_json::Number::from_f64(*f)
                .map(|n| ConfigValue::Json(serde_json::Value::Number(n)))
                .ok_or_else(|| self.error(&f.to_string(), "not a finite number")),
            (ValueType::String, other) => Ok(ConfigValue::String(other.to_raw_string())),
            (_, other) => self.parse(&other.to_raw_string()),
        }
    }

    fn error(&self, raw: &str, reason: &str) -> CoercionError {
        CoercionError {
            raw: raw.to_string(),
            expected: *self,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ValueType::String),
            "integer" | "int" => Ok(ValueType::Integer),
            "float" | "number" => Ok(ValueType::Float),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "json" => Ok(ValueType::Json),
            other => Err(format!(
                "unknown value type '{}'. Valid values are: string, integer, float, boolean, json",
                other
            )),
        }
    }
}

/// A configuration value tagged with its runtime type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl ConfigValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConfigValue::String(_) => ValueType::String,
            ConfigValue::Integer(_) => ValueType::Integer,
            ConfigValue::Float(_) => ValueType::Float,
            ConfigValue::Boolean(_) => ValueType::Boolean,
            ConfigValue::Json(_) => ValueType::Json,
        }
    }

    /// Render the value the way it would be written to an environment
    /// variable or a store column.
    pub fn to_raw_string(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Boolean(b) => b.to_string(),
            ConfigValue::Json(serde_json::Value::String(s)) => s.clone(),
            ConfigValue::Json(v) => v.to_string(),
        }
    }

    /// Numeric view used by range checks and impact assessment.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Integer(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            ConfigValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            ConfigValue::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            ConfigValue::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            ConfigValue::Json(v) => v.as_str(),
            _ => None,
        }
    }

    /// Rough heap footprint in bytes, used for cache memory accounting.
    pub fn estimated_size(&self) -> usize {
        match self {
            ConfigValue::String(s) => s.len(),
            ConfigValue::Integer(_) | ConfigValue::Float(_) => 8,
            ConfigValue::Boolean(_) => 1,
            ConfigValue::Json(v) => v.to_string().len(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Integer(v as i64)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Integer(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Boolean(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(v: serde_json::Value) -> Self {
        ConfigValue::Json(v)
    }
}
