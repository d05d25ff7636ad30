//! Error types for TaskRank
//!
//! All errors use thiserror for structured error handling.
//! Rule violations from the priority model carry their own variants so
//! callers can map them to messages without parsing strings.

use serde::ser::SerializeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Total category weight would be {would_be}% (current {current}% + {attempted}%), maximum is 100%")]
    WeightExceeded {
        current: u32,
        attempted: u32,
        would_be: u32,
    },

    #[error("Category id already exists: {0}")]
    DuplicateId(String),

    #[error("Default category cannot be modified this way: {0}")]
    CannotModifyDefault(String),

    #[error("Default category cannot be deleted: {0}")]
    CannotDeleteDefault(String),

    #[error("Category {id} is used by {count} task(s)")]
    InUse { id: String, count: u32 },

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Restore error: {0}")]
    Restore(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Stable machine-readable kind, independent of the display wording.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Zip(_) => "zip",
            AppError::Validation(_) => "validation",
            AppError::WeightExceeded { .. } => "weight_exceeded",
            AppError::DuplicateId(_) => "duplicate_id",
            AppError::CannotModifyDefault(_) => "cannot_modify_default",
            AppError::CannotDeleteDefault(_) => "cannot_delete_default",
            AppError::InUse { .. } => "in_use",
            AppError::CategoryNotFound(_) | AppError::TaskNotFound(_) => "not_found",
            AppError::Backup(_) => "backup",
            AppError::Restore(_) => "restore",
            AppError::Generic(_) => "generic",
        }
    }

    /// True for errors caused by the caller's input rather than the environment.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::WeightExceeded { .. }
                | AppError::DuplicateId(_)
                | AppError::CannotModifyDefault(_)
                | AppError::CannotDeleteDefault(_)
                | AppError::InUse { .. }
                | AppError::CategoryNotFound(_)
                | AppError::TaskNotFound(_)
        )
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kind", self.kind())?;
        map.serialize_entry("message", &self.to_string())?;
        match self {
            AppError::WeightExceeded {
                current,
                attempted,
                would_be,
            } => {
                map.serialize_entry("current", current)?;
                map.serialize_entry("attempted", attempted)?;
                map.serialize_entry("would_be", would_be)?;
            }
            AppError::InUse { id, count } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("count", count)?;
            }
            _ => {}
        }
        map.end()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
