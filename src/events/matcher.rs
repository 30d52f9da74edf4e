//! Subscription key patterns.
//!
//! # Responsibilities
//! - Parse subscription patterns (`key`, `*`, `prefix*`, `*suffix`)
//! - Match event routing keys against a parsed pattern
//!
//! # Design Decisions
//! - An exact match on the raw pattern text always wins, so the literal
//!   key `"*"` matches the pattern `"*"` and `"a*"` matches `"a*"`
//! - Precedence: exact, then `*`, then `prefix*`, then `*suffix`
//! - Case-sensitive; no regex, matching is O(n) in the key length

use std::fmt;

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Matches one key.
    Exact(String),
    /// `*`: matches every key.
    Any,
    /// `prefix*`: keys starting with the prefix.
    Prefix(String),
    /// `*suffix`: keys ending with the suffix.
    Suffix(String),
}

impl KeyPattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            KeyPattern::Any
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            KeyPattern::Prefix(prefix.to_string())
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            KeyPattern::Suffix(suffix.to_string())
        } else {
            KeyPattern::Exact(pattern.to_string())
        }
    }

    /// Returns true if `key` is selected by this pattern.
    pub fn matches(&self, key: &str) -> bool {
        if self.as_raw() == key {
            return true;
        }
        match self {
            KeyPattern::Exact(_) => false,
            KeyPattern::Any => true,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Suffix(suffix) => key.ends_with(suffix.as_str()),
        }
    }

    /// The pattern as it was written.
    pub fn as_raw(&self) -> String {
        match self {
            KeyPattern::Exact(key) => key.clone(),
            KeyPattern::Any => "*".to_string(),
            KeyPattern::Prefix(prefix) => format!("{}*", prefix),
            KeyPattern::Suffix(suffix) => format!("*{}", suffix),
        }
    }
}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        KeyPattern::parse(pattern)
    }
}

impl From<String> for KeyPattern {
    fn from(pattern: String) -> Self {
        KeyPattern::parse(&pattern)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_raw())
    }
}
