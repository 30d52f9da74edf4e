//! Service settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → ConfigService::new
//!
//! store file edits:
//!     watcher.rs detects change
//!     → FileStore::reload (diff against the current snapshot)
//!     → ConfigService::notify_change_from per changed key
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded; only configuration values hot-reload
//! - All fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, EventBusConfig, LifecycleConfig, ObservabilityConfig, ResolutionConfig,
    ServiceConfig, StoreConfig, ValidationConfig,
};
pub use watcher::{StoreWatcher, WATCHER_ORIGIN};
