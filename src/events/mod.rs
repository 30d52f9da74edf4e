//! Change events and their delivery.
//!
//! # Data Flow
//! ```text
//! ConfigService (notify_change, refresh, lifecycle)
//!     → bus.rs publish (bounded queue, fails fast when full)
//!     → dispatcher: registry scan, matcher.rs per subscription
//!     → bounded queue per subscription, drained by its own delivery task
//!     → EventHandler on the blocking pool, with timeout and panic capture
//! ```
//!
//! # Design Decisions
//! - Publishers never wait for subscribers
//! - Failures are recorded on the subscription and logged, never propagated
//! - A full subscriber queue drops that subscriber's event and counts it
//! - Shutdown drains the queue before joining the delivery tasks

pub mod bus;
pub mod matcher;
pub mod subscription;
pub mod types;

pub use bus::{BusStats, EventBus};
pub use matcher::KeyPattern;
pub use subscription::{EventHandler, Subscription, SubscriptionId, SubscriptionInfo};
pub use types::{ConfigEvent, EventType, LifecycleState, WILDCARD_KEY};
