//! TOML-backed store.
//!
//! The whole file is one document:
//!
//! ```toml
//! [values.max_concurrent_jobs]
//! value = "8"
//! type = "integer"
//! updated_at = 1735689600
//!
//! [[audit]]
//! key = "max_concurrent_jobs"
//! old = "10"
//! new = "8"
//! actor = "alice"
//! reason = "load test"
//! at = 1735689600
//! ```
//!
//! Readers see an immutable snapshot swapped in after each successful
//! write or reload. Writes are serialized and land via a temp file and
//! rename, so a concurrent reader of the file never sees a partial document.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::StoreError;
use crate::registry::{ConfigValue, ValueType};
use crate::store::{AuditEntry, ConfigStore, StoreRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    values: BTreeMap<String, FileRecord>,
    #[serde(default)]
    audit: Vec<FileAudit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    value: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(default)]
    updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileAudit {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    old: Option<String>,
    new: String,
    actor: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    at: u64,
}

/// Parsed contents of the store file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub records: BTreeMap<String, StoreRecord>,
    pub audit: Vec<AuditEntry>,
}

/// A key whose record differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old: Option<StoreRecord>,
    /// `None` when the key was removed from the file.
    pub new: Option<StoreRecord>,
}

/// Store persisted as a TOML file.
pub struct FileStore {
    path: PathBuf,
    snapshot: ArcSwap<StoreSnapshot>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(content) => parse_document(&path, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = ?path, records = snapshot.records.len(), "File store opened");
        Ok(Self {
            path,
            snapshot: ArcSwap::from_pointee(snapshot),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshot.load_full()
    }

    /// Re-read the file and return the keys whose value or type changed.
    ///
    /// A file that fails to parse leaves the current snapshot in place.
    pub async fn reload(&self) -> Result<Vec<StoreChange>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let next = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_document(&self.path, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(e.into()),
        };
        let current = self.snapshot.load_full();
        let changes = diff(&current, &next);
        self.snapshot.store(Arc::new(next));
        Ok(changes)
    }

    async fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let content = render_document(snapshot).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn get_by_key(&self, key: &str) -> Result<Option<StoreRecord>, StoreError> {
        Ok(self.snapshot.load().records.get(key).cloned())
    }

    async fn update(
        &self,
        key: &str,
        value: &ConfigValue,
        actor: &str,
        reason: &str,
    ) -> Result<StoreRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut next = StoreSnapshot::clone(&self.snapshot.load());

        let record = StoreRecord::new(key, value);
        let old = next.records.insert(key.to_string(), record.clone());
        next.audit.push(AuditEntry {
            key: key.to_string(),
            old_raw_value: old.map(|r| r.raw_value),
            new_raw_value: record.raw_value.clone(),
            actor: actor.to_string(),
            reason: reason.to_string(),
            at: record.last_updated_at,
        });

        self.persist(&next).await?;
        self.snapshot.store(Arc::new(next));
        tracing::debug!(key = %key, actor = %actor, path = ?self.path, "Store record written");
        Ok(record)
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.snapshot.load().audit.clone())
    }
}

fn parse_document(path: &Path, content: &str) -> Result<StoreSnapshot, StoreError> {
    let doc: StoreDocument = toml::from_str(content).map_err(|e| StoreError::Corrupt {
        key: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let records = doc
        .values
        .into_iter()
        .map(|(key, r)| {
            let record = StoreRecord {
                key: key.clone(),
                raw_value: r.value,
                value_type: r.value_type,
                last_updated_at: from_secs(r.updated_at),
            };
            (key, record)
        })
        .collect();

    let audit = doc
        .audit
        .into_iter()
        .map(|a| AuditEntry {
            key: a.key,
            old_raw_value: a.old,
            new_raw_value: a.new,
            actor: a.actor,
            reason: a.reason,
            at: from_secs(a.at),
        })
        .collect();

    Ok(StoreSnapshot { records, audit })
}

fn render_document(snapshot: &StoreSnapshot) -> Result<String, toml::ser::Error> {
    let doc = StoreDocument {
        values: snapshot
            .records
            .iter()
            .map(|(key, r)| {
                let record = FileRecord {
                    value: r.raw_value.clone(),
                    value_type: r.value_type,
                    updated_at: to_secs(r.last_updated_at),
                };
                (key.clone(), record)
            })
            .collect(),
        audit: snapshot
            .audit
            .iter()
            .map(|a| FileAudit {
                key: a.key.clone(),
                old: a.old_raw_value.clone(),
                new: a.new_raw_value.clone(),
                actor: a.actor.clone(),
                reason: a.reason.clone(),
                at: to_secs(a.at),
            })
            .collect(),
    };
    toml::to_string_pretty(&doc)
}

fn diff(current: &StoreSnapshot, next: &StoreSnapshot) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    for (key, new) in &next.records {
        let old = current.records.get(key);
        let same =
            old.is_some_and(|o| o.raw_value == new.raw_value && o.value_type == new.value_type);
        if !same {
            changes.push(StoreChange {
                key: key.clone(),
                old: old.cloned(),
                new: Some(new.clone()),
            });
        }
    }
    for (key, old) in &current.records {
        if !next.records.contains_key(key) {
            changes.push(StoreChange {
                key: key.clone(),
                old: Some(old.clone()),
                new: None,
            });
        }
    }
    changes
}

fn to_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn from_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
