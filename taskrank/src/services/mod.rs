//! Services module
//!
//! Business logic services that coordinate between the CLI and repository.

pub mod backup;
pub mod categories;
pub mod settings;
pub mod tasks;
pub mod transfer;

pub use backup::{BackupService, RestoreSummary, StoreSnapshot};
pub use categories::{BulkWeightOutcome, CategoryService};
pub use settings::{AppSettings, BackupSettings, SettingsService, TaskListSettings};
pub use tasks::{RescoreScope, TaskService};
pub use transfer::{
    parse_legacy_tasks, ExportBundle, ImportMode, ImportReport, SkippedItem, SkippedKind,
    TransferService,
};
