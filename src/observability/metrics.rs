//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dynconf_resolutions_total` (counter): resolutions by source
//! - `dynconf_resolution_not_found_total` (counter): exhausted fallback chains
//! - `dynconf_store_errors_total` (counter): store lookups degraded to the next step
//! - `dynconf_coercion_failures_total` (counter): raw values that failed their declared type
//! - `dynconf_cache_evictions_total` (counter): evictions by reason (expired, lru, memory)
//! - `dynconf_cache_size` (gauge): live cache entries
//! - `dynconf_events_published_total` (counter): accepted events by type
//! - `dynconf_events_dropped_total` (counter): rejected publishes by reason
//! - `dynconf_callback_failures_total` (counter): subscriber failures by kind
//! - `dynconf_restart_pending` (gauge): keys awaiting a process restart
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed by the daemon binary

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_resolution(source: &'static str) {
    counter!("dynconf_resolutions_total", "source" => source).increment(1);
}

pub fn record_not_found() {
    counter!("dynconf_resolution_not_found_total").increment(1);
}

pub fn record_store_error() {
    counter!("dynconf_store_errors_total").increment(1);
}

pub fn record_coercion_failure(origin: &'static str) {
    counter!("dynconf_coercion_failures_total", "origin" => origin).increment(1);
}

pub fn record_cache_eviction(reason: &'static str) {
    counter!("dynconf_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("dynconf_cache_size").set(size as f64);
}

pub fn record_event_published(event_type: &'static str) {
    counter!("dynconf_events_published_total", "event_type" => event_type).increment(1);
}

pub fn record_event_dropped(reason: &'static str) {
    counter!("dynconf_events_dropped_total", "reason" => reason).increment(1);
}

pub fn record_callback_failure(kind: &'static str) {
    counter!("dynconf_callback_failures_total", "kind" => kind).increment(1);
}

pub fn record_restart_pending(count: usize) {
    gauge!("dynconf_restart_pending").set(count as f64);
}
