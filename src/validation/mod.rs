//! Validation of proposed configuration values.
//!
//! # Data Flow
//! ```text
//! set_and_notify / admin CLI
//!     → validator.rs validate (coercion → hard rules → recommended range)
//!     → conflicts.rs over the effective set with the new value applied
//!     → impact.rs for the operator-facing assessment
//!
//! repeated failures
//!     → success rate below threshold → fallback.rs safe set
//! ```
//!
//! # Design Decisions
//! - Errors reject a value; warnings never do
//! - Conflict rules are plain predicates, evaluated only when all their keys are present
//! - Sensitive values are masked in every message

pub mod conflicts;
pub mod fallback;
pub mod impact;
pub mod report;
pub mod validator;

pub use conflicts::{
    default_rules, detect_conflicts, ConfigSet, Conflict, ConflictRule, ConflictSeverity,
};
pub use fallback::safe_values;
pub use impact::{assess_impact, ImpactAssessment, ImpactLevel};
pub use report::ValidationReport;
pub use validator::ConfigValidator;
