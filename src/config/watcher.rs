//! Store file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::registry::ConfigValue;
use crate::resolution::ConfigService;
use crate::store::file::{FileStore, StoreChange};
use crate::store::StoreRecord;

/// Origin recorded on change events raised by external file edits.
pub const WATCHER_ORIGIN: &str = "file_watcher";

/// Watches a [`FileStore`] file and propagates external edits.
///
/// Every key whose value changed goes through
/// [`ConfigService::notify_change_from`]; removed keys are refreshed so
/// the next read falls back to the environment or the schema default.
pub struct StoreWatcher {
    path: PathBuf,
    store: Arc<FileStore>,
    service: Arc<ConfigService>,
}

impl StoreWatcher {
    pub fn new(store: Arc<FileStore>, service: Arc<ConfigService>) -> Self {
        Self {
            path: store.path().to_path_buf(),
            store,
            service,
        }
    }

    /// Start watching.
    ///
    /// The file's directory is watched rather than the file, because the
    /// store replaces the file by rename. Events are handed to a Tokio task
    /// that reloads and diffs the store; the task stops on shutdown or
    /// when the returned watcher is dropped.
    pub fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(RecommendedWatcher, JoinHandle<()>), notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let kind = &event.kind;
                    let relevant = (kind.is_modify() || kind.is_create() || kind.is_remove())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Store watcher started");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    signal = rx.recv() => {
                        if signal.is_none() {
                            break;
                        }
                        // Collapse bursts of events from a single save.
                        while rx.try_recv().is_ok() {}
                        self.reload().await;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Store watcher received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        Ok((watcher, handle))
    }

    /// Reload the store and propagate every change. Returns how many keys changed.
    pub async fn reload(&self) -> usize {
        let changes = match self.store.reload().await {
            Ok(changes) => changes,
            Err(e) => {
                tracing::error!("Failed to reload store: {}. Keeping current values.", e);
                return 0;
            }
        };
        if !changes.is_empty() {
            tracing::info!(
                path = ?self.path,
                changed = changes.len(),
                "Store file change detected"
            );
        }
        for change in &changes {
            self.apply(change);
        }
        changes.len()
    }

    fn apply(&self, change: &StoreChange) {
        let Some(new) = &change.new else {
            self.service.refresh(&change.key);
            return;
        };
        let Some(new_value) = self.typed(new) else {
            return;
        };
        let old_value = change.old.as_ref().and_then(|r| self.typed(r));
        self.service
            .notify_change_from(&change.key, old_value, new_value, WATCHER_ORIGIN);
    }

    fn typed(&self, record: &StoreRecord) -> Option<ConfigValue> {
        let value_type = self
            .service
            .schemas()
            .get(&record.key)
            .map(|s| s.value_type)
            .unwrap_or(record.value_type);
        match value_type.parse(&record.raw_value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    key = %record.key,
                    error = %e,
                    "Ignoring store record with invalid value"
                );
                None
            }
        }
    }
}
