//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: key, source, subscription)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (daemon only)
//! ```
//!
//! # Design Decisions
//! - Sensitive values never appear in log fields
//! - Metrics are cheap facade calls; no recorder means no cost beyond a branch

pub mod logging;
pub mod metrics;
