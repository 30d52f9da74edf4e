//! In-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::error::StoreError;
use crate::registry::ConfigValue;
use crate::store::{AuditEntry, ConfigStore, StoreRecord};

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, StoreRecord>,
    audit: Vec<AuditEntry>,
}

/// A process-local store.
///
/// `set_unavailable(true)` makes every call fail, which is how callers
/// exercise degraded store paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without auditing.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        let record = StoreRecord::new(key.clone(), &value.into());
        self.write_state().records.insert(key, record);
    }

    /// Seed a raw record, bypassing type inference.
    pub fn insert_raw(&self, record: StoreRecord) {
        self.write_state().records.insert(record.key.clone(), record);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get_by_key` calls served.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful updates.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn record(&self, key: &str) -> Option<StoreRecord> {
        self.read_state().records.get(key).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_by_key(&self, key: &str) -> Result<Option<StoreRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.read_state().records.get(key).cloned())
    }

    async fn update(
        &self,
        key: &str,
        value: &ConfigValue,
        actor: &str,
        reason: &str,
    ) -> Result<StoreRecord, StoreError> {
        self.check_available()?;
        let record = StoreRecord::new(key, value);

        let mut state = self.write_state();
        let old = state.records.insert(key.to_string(), record.clone());
        state.audit.push(AuditEntry {
            key: key.to_string(),
            old_raw_value: old.map(|r| r.raw_value),
            new_raw_value: record.raw_value.clone(),
            actor: actor.to_string(),
            reason: reason.to_string(),
            at: SystemTime::now(),
        });
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.check_available()?;
        Ok(self.read_state().audit.clone())
    }
}
