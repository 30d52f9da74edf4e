//! Resolution cache.
//!
//! # Data Flow
//! ```text
//! ConfigService::resolve
//!     → lru.rs get (hit → ResolvedValue, expired → miss + eviction)
//!     → on miss, the fallback chain result is written back via set
//!
//! NotifyChange / Refresh
//!     → invalidate(key) / clear()
//!
//! cleanup.rs (background)
//!     → cleanup_expired() every interval until shutdown
//! ```
//!
//! # Design Decisions
//! - One mutex guards the map and the counters
//! - Strict LRU by access order; at most one eviction per gating condition on set
//! - Memory is estimated, not measured; it only drives soft eviction
//! - A poisoned lock resets the cache instead of failing the read

pub mod cleanup;
pub mod entry;
pub mod lru;
pub mod stats;

pub use cleanup::CacheJanitor;
pub use entry::{CacheEntry, ResolvedValue, ValueSource};
pub use lru::ConfigCache;
pub use stats::CacheStats;
