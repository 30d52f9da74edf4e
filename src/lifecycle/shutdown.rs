//! Shutdown coordination for background tasks.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::ShutdownError;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to,
/// and tracks their handles so shutdown can wait for them with a deadline.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    /// Tasks to join on completion.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a task to be joined by [`Shutdown::complete`].
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).push(handle);
    }

    /// Trigger the signal and wait for every tracked task, up to `timeout`.
    ///
    /// Tasks still running at the deadline are left detached and reported
    /// in the error.
    pub async fn complete(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.trigger();
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|p| p.into_inner()));
        let pending = handles.len();

        match tokio::time::timeout(timeout, futures_util::future::join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        if e.is_panic() {
                            return Err(ShutdownError::TaskFailed(e.to_string()));
                        }
                    }
                }
                Ok(())
            }
            Err(_) => {
                tracing::error!(?timeout, pending, "Background tasks did not stop in time");
                Err(ShutdownError::TimedOut { timeout, pending })
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_joins_cooperative_tasks() {
        let shutdown = Shutdown::new();
        for _ in 0..3 {
            let mut rx = shutdown.subscribe();
            shutdown.track(tokio::spawn(async move {
                let _ = rx.recv().await;
            }));
        }
        assert_eq!(shutdown.receiver_count(), 3);
        shutdown.complete(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_reports_stuck_tasks() {
        let shutdown = Shutdown::new();
        shutdown.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }));

        let err = shutdown.complete(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(
            err,
            ShutdownError::TimedOut {
                timeout: Duration::from_millis(50),
                pending: 1
            }
        );
    }
}
