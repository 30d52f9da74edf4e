//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → background tasks observe broadcast → bounded join
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ConfigService::shutdown
//!     SIGHUP → ConfigService::refresh_all
//! ```
//!
//! # Design Decisions
//! - Every background task subscribes before it is spawned
//! - Shutdown has a timeout: tasks still running at the deadline are reported, not awaited

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
