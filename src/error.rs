//! Error taxonomy shared by every subsystem.
//!
//! # Propagation
//! - Read paths (`resolve*`) only ever surface [`ResolveError::NotFound`];
//!   store, environment and cache failures are absorbed and counted.
//! - Write paths (`set_and_notify`) return [`SetError`] with the full
//!   validation report so an administrator can correct the input.
//! - Subscriber failures become [`CallbackError`] values inside the bus and
//!   never reach the publisher.

use std::time::Duration;
use thiserror::Error;

use crate::registry::ValueType;
use crate::validation::{Conflict, ValidationReport};

/// Error returned by metadata-carrying resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No cache, environment, store or schema default value exists.
    #[error("configuration not found: {0}")]
    NotFound(String),
}

/// A raw value could not be converted to its declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot coerce {raw:?} to {expected}: {reason}")]
pub struct CoercionError {
    pub raw: String,
    pub expected: ValueType,
    pub reason: String,
}

/// Failures raised by a persistent store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (I/O, connection, poisoned state).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record is malformed.
    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single subscriber callback. Isolated per subscription.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("callback failed: {0}")]
    Failed(String),

    /// The callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// The callback did not finish within the configured budget.
    #[error("callback timed out after {0:?}")]
    TimedOut(Duration),
}

impl CallbackError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackError::Failed(_) => "failed",
            CallbackError::Panicked(_) => "panicked",
            CallbackError::TimedOut(_) => "timeout",
        }
    }
}

/// A rejected administrative write.
#[derive(Debug, Error)]
pub enum SetError {
    /// The key has no registered schema.
    #[error("no schema registered for {0}")]
    UnknownKey(String),

    /// The value violated one or more schema rules.
    #[error("validation failed for {key}: {}", report.errors.join("; "))]
    Validation {
        key: String,
        report: ValidationReport,
        /// True when the caller should prefer the safe fallback set.
        safe_fallback_available: bool,
    },

    /// The value conflicts with the rest of the effective configuration.
    #[error("{} conflicting setting(s) for {key}", conflicts.len())]
    Conflict { key: String, conflicts: Vec<Conflict> },

    /// The store rejected or failed the update. No event was published.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Graceful shutdown did not complete in time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("shutdown timed out after {timeout:?} with {pending} task(s) still running")]
    TimedOut { timeout: Duration, pending: usize },

    #[error("background task failed during shutdown: {0}")]
    TaskFailed(String),
}
