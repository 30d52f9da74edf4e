//! dynconf daemon.
//!
//! Runs a [`ConfigService`] over a watched TOML store, logs every event,
//! refreshes the cache on SIGHUP and shuts down gracefully on Ctrl-C or
//! SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dynconf::config::{load_config, ConfigError, ServiceConfig, StoreWatcher};
use dynconf::events::{ConfigEvent, EventType};
use dynconf::lifecycle::{signals, Shutdown};
use dynconf::observability::{logging, metrics};
use dynconf::resolution::{ConfigService, ProcessEnv};
use dynconf::store::FileStore;
use dynconf::SchemaRegistry;

#[derive(Parser)]
#[command(name = "dynconf")]
#[command(about = "Dynamic configuration propagation daemon", long_about = None)]
struct Args {
    /// Service settings file. Missing file means defaults.
    #[arg(short, long, default_value = "dynconf.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, missing) = match load_config(&args.config) {
        Ok(config) => (config, false),
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            (ServiceConfig::default(), true)
        }
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("dynconf v{} starting", env!("CARGO_PKG_VERSION"));
    if missing {
        tracing::warn!(path = ?args.config, "Settings file not found, using defaults");
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let schemas = Arc::new(SchemaRegistry::with_defaults());
    let store = Arc::new(FileStore::open(&config.store.path)?);
    tracing::info!(
        store = %config.store.path,
        records = store.snapshot().records.len(),
        schemas = schemas.len(),
        "Configuration loaded"
    );

    let service = Arc::new(ConfigService::new(
        config.clone(),
        schemas.clone(),
        store.clone(),
        Arc::new(ProcessEnv),
    )?);

    for event_type in [
        EventType::Changed,
        EventType::Invalidated,
        EventType::RestartRequired,
        EventType::ServiceLifecycle,
    ] {
        let schemas = schemas.clone();
        service.subscribe_events(event_type, "*", move |event: &ConfigEvent| {
            log_event(&schemas, event);
            Ok(())
        });
    }

    let background = Shutdown::new();
    let _watcher = if config.store.watch {
        let (watcher, handle) =
            StoreWatcher::new(store.clone(), service.clone()).run(background.subscribe())?;
        background.track(handle);
        Some(watcher)
    } else {
        None
    };
    background.track(signals::spawn_reload_listener(service.clone(), background.subscribe())?);

    signals::wait_for_shutdown().await;

    let timeout = Duration::from_millis(config.lifecycle.shutdown_timeout_ms);
    if let Err(e) = background.complete(timeout).await {
        tracing::error!(error = %e, "Background tasks did not stop cleanly");
    }
    service.shutdown().await?;

    tracing::info!(stats = ?service.stats().resolution, "Shutdown complete");
    Ok(())
}

fn log_event(schemas: &SchemaRegistry, event: &ConfigEvent) {
    match event {
        ConfigEvent::Changed {
            key,
            new_value,
            source,
            requires_restart,
            ..
        } => {
            let shown = schemas
                .get(key)
                .map(|s| s.redact(new_value))
                .unwrap_or_else(|| new_value.to_raw_string());
            tracing::info!(
                key = %key,
                value = %shown,
                origin = %source,
                requires_restart,
                "changed"
            );
        }
        ConfigEvent::Invalidated { key, reason, .. } => {
            tracing::info!(key = %key, reason = %reason, "invalidated");
        }
        ConfigEvent::RestartRequired { keys, reason, .. } => {
            tracing::warn!(keys = ?keys, reason = %reason, "restart required");
        }
        ConfigEvent::ServiceLifecycle { state, .. } => {
            tracing::info!(state = ?state, "lifecycle");
        }
    }
}
