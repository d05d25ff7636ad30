//! Priority model
//!
//! The rule core of the application, free of storage and I/O:
//! - `ratings`: bounded per-category ratings
//! - `validation`: category and task field rules
//! - `weights`: the per-scope total weight invariant
//! - `scoring`: the priority score computation
//! - `registry`: category create/update/delete/bulk rules
//! - `defaults`: the canonical default category set

pub mod defaults;
pub mod ratings;
pub mod registry;
pub mod scoring;
pub mod validation;
pub mod weights;

pub use defaults::{default_categories, DEFAULT_CATEGORIES};
pub use ratings::{PriorityRatings, Rating};
pub use registry::{ensure_unused, BulkWeightPlan, CategoryRegistry, ScopeWeightReport};
pub use scoring::{compute_score, days_until_due, score_breakdown, urgency_bonus, ScoreBreakdown};
pub use weights::{check_prospective, validate_total, WeightCheck};
