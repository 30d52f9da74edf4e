//! Schema registry and typed values.
//!
//! # Data Flow
//! ```text
//! startup
//!     → defaults.rs (built-in catalog) + caller schemas
//!     → SchemaRegistry (immutable, shared via Arc)
//!
//! resolution / validation
//!     → SchemaRegistry::get(key)
//!     → ValueType::parse / coerce (value.rs)
//!     → ConfigValue
//! ```
//!
//! # Design Decisions
//! - Values are a closed sum type; coercion is an explicit function per type
//! - The registry is injected, never global, so independent services can coexist
//! - A missing schema is a warning on read paths, not an error

pub mod defaults;
pub mod schema;
pub mod value;

pub use schema::{Category, ConfigSchema, RulePattern, SchemaRegistry, ValidationRules};
pub use value::{ConfigValue, ValueType};
