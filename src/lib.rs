//! Dynamic configuration propagation.
//!
//! Resolves configuration values through a prioritized fallback chain,
//! caches them with per-key expiry and notifies subscribers when values
//! change, without restarting the process.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!   resolve(key)  │                  ConfigService                      │
//!  ───────────────┼─▶ cache ─▶ environment ─▶ store ─▶ schema default   │
//!                 │     ▲                       │                        │
//!                 │     └──── populate ─────────┘                        │
//!                 │                                                      │
//!   set_and_notify│   validator ─▶ store.update ─▶ notify_change         │
//!  ───────────────┼─▶ (rules,       (audited)        │                   │
//!                 │    conflicts)                    ▼                   │
//!                 │                    invalidate + restart bookkeeping  │
//!                 │                                  │                   │
//!                 │                                  ▼                   │
//!                 │    EventBus: queue ─▶ dispatcher ─▶ per-subscriber ──┼──▶ subscribers
//!                 │                                     queues           │
//!                 └────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod cache;
pub mod events;
pub mod registry;
pub mod resolution;
pub mod store;
pub mod validation;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use cache::{ResolvedValue, ValueSource};
pub use config::ServiceConfig;
pub use error::{CallbackError, ResolveError, SetError, ShutdownError, StoreError};
pub use events::{ConfigEvent, EventType, SubscriptionId};
pub use lifecycle::Shutdown;
pub use registry::{ConfigSchema, ConfigValue, SchemaRegistry, ValueType};
pub use resolution::{ConfigService, SetOutcome};
pub use store::ConfigStore;
