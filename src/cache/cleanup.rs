//! Periodic removal of expired cache entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::cache::lru::ConfigCache;

/// Background sweeper bounding staleness independent of read pressure.
pub struct CacheJanitor {
    cache: Arc<ConfigCache>,
    interval: Duration,
}

impl CacheJanitor {
    pub fn new(cache: Arc<ConfigCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Sweep on every tick until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Cache janitor starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.cache.cleanup_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Removed expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache janitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{ResolvedValue, ValueSource};
    use crate::registry::{ConfigValue, ValueType};
    use std::time::SystemTime;

    #[tokio::test]
    async fn test_janitor_sweeps_and_stops() {
        let cache = Arc::new(ConfigCache::new(10, 1024 * 1024, Duration::from_secs(60)));
        cache.set(
            "k",
            ResolvedValue {
                key: "k".into(),
                value: ConfigValue::Boolean(true),
                value_type: ValueType::Boolean,
                source: ValueSource::Default,
                requires_restart: false,
                last_updated: None,
                resolved_at: SystemTime::now(),
                ttl: Duration::from_millis(10),
            },
            Some(Duration::from_millis(10)),
        );

        let (tx, rx) = broadcast::channel(1);
        let janitor = CacheJanitor::new(cache.clone(), Duration::from_millis(20));
        let handle = tokio::spawn(janitor.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.peek("k").is_none());
        assert_eq!(cache.stats().evictions, 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("janitor did not stop")
            .unwrap();
    }
}
