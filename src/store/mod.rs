//! Persistent configuration stores.
//!
//! # Data Flow
//! ```text
//! ConfigService::resolve (step 3 of the fallback chain)
//!     → ConfigStore::get_by_key → StoreRecord (raw string + declared type)
//!     → ValueType::parse
//!
//! ConfigService::set_and_notify
//!     → ConfigStore::update (appends an AuditEntry) → notify_change
//! ```
//!
//! # Design Decisions
//! - Records hold raw strings; typing happens in the service against the schema
//! - Every update is audited with actor and reason
//! - `memory.rs` backs tests and embedded use; `file.rs` backs the binaries

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::StoreError;
use crate::registry::{ConfigValue, ValueType};

pub use file::FileStore;
pub use memory::MemoryStore;

/// A persisted value as the store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub key: String,
    pub raw_value: String,
    pub value_type: ValueType,
    pub last_updated_at: SystemTime,
}

impl StoreRecord {
    pub fn new(key: impl Into<String>, value: &ConfigValue) -> Self {
        Self {
            key: key.into(),
            raw_value: value.to_raw_string(),
            value_type: value.value_type(),
            last_updated_at: SystemTime::now(),
        }
    }
}

/// One recorded update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub key: String,
    pub old_raw_value: Option<String>,
    pub new_raw_value: String,
    pub actor: String,
    pub reason: String,
    pub at: SystemTime,
}

/// A keyed record store with audited updates.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_by_key(&self, key: &str) -> Result<Option<StoreRecord>, StoreError>;

    async fn update(
        &self,
        key: &str,
        value: &ConfigValue,
        actor: &str,
        reason: &str,
    ) -> Result<StoreRecord, StoreError>;

    /// Audit entries, oldest first.
    async fn audit_log(&self) -> Result<Vec<AuditEntry>, StoreError>;
}
