//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dynconf::config::ServiceConfig;
use dynconf::events::ConfigEvent;
use dynconf::resolution::{ConfigService, MapEnv};
use dynconf::store::MemoryStore;
use dynconf::{CallbackError, SchemaRegistry};

/// A service over in-memory collaborators.
pub struct TestService {
    pub service: Arc<ConfigService>,
    pub store: Arc<MemoryStore>,
    pub env: Arc<MapEnv>,
}

/// Settings with a short callback budget and prefix `PREFIX`.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.resolution.env_prefix = "PREFIX".into();
    config.event_bus.callback_timeout_ms = 500;
    config.lifecycle.shutdown_timeout_ms = 2_000;
    config
}

/// Build a service with the built-in catalog.
pub fn build_service() -> TestService {
    build_service_with(test_config(), SchemaRegistry::with_defaults(), MapEnv::new())
}

pub fn build_service_with(
    config: ServiceConfig,
    schemas: SchemaRegistry,
    env: MapEnv,
) -> TestService {
    let store = Arc::new(MemoryStore::new());
    let env = Arc::new(env);
    let service =
        ConfigService::new(config, Arc::new(schemas), store.clone(), env.clone()).unwrap();
    let service = Arc::new(service);
    TestService { service, store, env }
}

/// Collects every event it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<ConfigEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that appends to this recorder.
    pub fn handler(
        &self,
    ) -> impl Fn(&ConfigEvent) -> Result<(), CallbackError> + Send + Sync + 'static {
        let events = self.events.clone();
        move |event: &ConfigEvent| {
            events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    pub fn events(&self) -> Vec<ConfigEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Keys of recorded `Changed` events, in delivery order.
    pub fn changed_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ConfigEvent::Changed { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `f` with a timeout, panicking if it does not finish.
pub async fn within<T>(timeout: Duration, f: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, f).await.expect("operation timed out")
}
