//! Configuration resolution.
//!
//! # Data Flow
//! ```text
//! resolve(key)
//!     → cache (hit → source=Cache)
//!     → env.rs  PREFIX_<UPPER_KEY>, coerced to the schema type
//!     → ConfigStore::get_by_key, parsed to the schema type
//!     → schema default
//!     → NotFound / caller fallback
//!
//! notify_change(key, old, new)
//!     → cache invalidate → restart.rs (if schema requires) → EventBus publish
//! ```
//!
//! # Design Decisions
//! - Read paths never fail on store, environment or cache trouble; they count and log it
//! - Schemas, store and environment are injected, so tests need no process state
//! - Writes through `set_and_notify` publish only after the store confirms

pub mod env;
pub mod restart;
pub mod service;
pub mod stats;

pub use env::{env_var_name, EnvSource, MapEnv, ProcessEnv};
pub use restart::{RestartPriority, RestartRequirement, RestartTracker};
pub use service::{ConfigService, SetOutcome};
pub use stats::{ResolutionCounters, ResolutionStats, ServiceStats};
