//! Application configuration constants
//!
//! Central location for all configuration constants, rule limits,
//! and validation boundaries used throughout the application.

// ===== Category Weights =====

/// Maximum total weight of all categories visible in one owner scope
pub const MAX_TOTAL_WEIGHT: u32 = 100;

/// Maximum weight of a single category (percent)
pub const MAX_CATEGORY_WEIGHT: u32 = 100;

// ===== Ratings =====

/// Highest rating a task can receive for one category
pub const MAX_RATING: u8 = 5;

// ===== Category Fields =====

/// Maximum length of a category id slug
pub const MAX_CATEGORY_ID_LENGTH: usize = 50;

/// Maximum length of a category display name (and secondary name)
pub const MAX_CATEGORY_NAME_LENGTH: usize = 100;

// ===== Task Fields =====

/// Maximum length of a task title after trimming
pub const MAX_TASK_TITLE_LENGTH: usize = 200;

/// Maximum length of a project name
pub const MAX_PROJECT_LENGTH: usize = 100;

/// Maximum length of a goal description
pub const MAX_GOAL_LENGTH: usize = 500;

/// Maximum length of free-text notes
pub const MAX_NOTES_LENGTH: usize = 5000;

/// Maximum length of a task link
pub const MAX_LINK_LENGTH: usize = 2048;

/// Earliest accepted due date, as (year, month, day).
/// Dates before this are almost always typos in legacy imports.
pub const MIN_DUE_DATE: (i32, u32, u32) = (2000, 1, 1);

// ===== Urgency Bonus =====

/// Urgency tiers as (max days until due, bonus points), checked in order.
/// Overdue tasks fall into the first tier.
pub const URGENCY_TIERS: &[(i64, f64)] = &[(1, 20.0), (3, 15.0), (7, 10.0), (14, 5.0)];

// ===== Backup =====

/// Number of backup archives kept on disk when settings don't say otherwise
pub const DEFAULT_BACKUP_RETENTION_COUNT: usize = 10;

/// Minimum backup retention count (always keep the latest archive)
pub const MIN_BACKUP_RETENTION_COUNT: usize = 1;

/// Maximum backup retention count
pub const MAX_BACKUP_RETENTION_COUNT: usize = 365;

// ===== Import / Export =====

/// Current export bundle format version
pub const EXPORT_FORMAT_VERSION: u32 = 1;

// ===== Task Listing =====

/// Default number of tasks shown by the CLI list command
pub const DEFAULT_LIST_LIMIT: usize = 50;
