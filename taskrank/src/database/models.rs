//! Database models
//!
//! Rust structs representing database entities.
//! All models use serde for import/export and CLI output.

use crate::error::AppError;
use crate::priority::PriorityRatings;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// A weighted priority category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub display_name: String,
    /// Alternate-language label
    pub secondary_name: Option<String>,
    /// Percentage contribution, 0-100
    pub weight: u32,
    pub color: String,
    pub is_default: bool,
    /// `None` for global defaults
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn builder(
        id: impl Into<String>,
        display_name: impl Into<String>,
        weight: u32,
    ) -> CategoryBuilder {
        let now = Utc::now();
        CategoryBuilder {
            category: Category {
                id: id.into(),
                display_name: display_name.into(),
                secondary_name: None,
                weight,
                color: "#808080".to_string(),
                is_default: false,
                owner_id: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Whether this category is visible in `owner`'s scope
    pub fn in_scope_of(&self, owner: Option<&str>) -> bool {
        self.is_default || (owner.is_some() && self.owner_id.as_deref() == owner)
    }
}

pub struct CategoryBuilder {
    category: Category,
}

impl CategoryBuilder {
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.category.color = color.into();
        self
    }

    pub fn secondary_name(mut self, name: impl Into<String>) -> Self {
        self.category.secondary_name = Some(name.into());
        self
    }

    pub fn default_category(mut self) -> Self {
        self.category.is_default = true;
        self.category.owner_id = None;
        self
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.category.is_default = false;
        self.category.owner_id = Some(owner_id.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.category.created_at = now;
        self.category.updated_at = now;
        self
    }

    pub fn build(self) -> Category {
        self.category
    }
}

/// Create category request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub secondary_name: Option<String>,
    pub weight: u32,
    pub color: String,
    #[serde(default)]
    pub is_default: bool,
}

impl From<&Category> for NewCategory {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id.clone(),
            display_name: c.display_name.clone(),
            secondary_name: c.secondary_name.clone(),
            weight: c.weight,
            color: c.color.clone(),
            is_default: c.is_default,
        }
    }
}

/// Update category request. `None` fields are left unchanged; an empty
/// `secondary_name` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub display_name: Option<String>,
    pub secondary_name: Option<String>,
    pub weight: Option<u32>,
    pub color: Option<String>,
    pub is_default: Option<bool>,
}

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Personal,
    Work,
    Learning,
    Health,
    Finance,
    Other,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Personal,
        TaskType::Work,
        TaskType::Learning,
        TaskType::Health,
        TaskType::Finance,
        TaskType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Personal => "personal",
            TaskType::Work => "work",
            TaskType::Learning => "learning",
            TaskType::Health => "health",
            TaskType::Finance => "finance",
            TaskType::Other => "other",
        }
    }
}

/// Task progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::OnHold,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::OnHold => "on_hold",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// How often a repeating task comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RepeatInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepeatInterval {
    pub const ALL: [RepeatInterval; 4] = [
        RepeatInterval::Daily,
        RepeatInterval::Weekly,
        RepeatInterval::Monthly,
        RepeatInterval::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatInterval::Daily => "daily",
            RepeatInterval::Weekly => "weekly",
            RepeatInterval::Monthly => "monthly",
            RepeatInterval::Yearly => "yearly",
        }
    }
}

/// Normalize "In Progress", "in-progress" and "IN_PROGRESS" alike
fn normalize_enum_input(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

macro_rules! impl_enum_text {
    ($ty:ident, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = normalize_enum_input(s);
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == normalized)
                    .ok_or_else(|| AppError::Validation(format!("Unknown {}: {:?}", $label, s)))
            }
        }
    };
}

impl_enum_text!(TaskType, "task type");
impl_enum_text!(TaskStatus, "task status");
impl_enum_text!(RepeatInterval, "repeat interval");

/// A task with its category ratings and cached priority score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub project: Option<String>,
    pub goal: Option<String>,
    pub notes: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub is_repeating: bool,
    pub repeat_interval: Option<RepeatInterval>,
    pub link: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub priority_ratings: PriorityRatings,
    /// Cache of the computed score, never edited directly
    #[serde(default)]
    pub priority_score: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Apply a status change. `completed_at` is set on the transition into
    /// `Completed` and cleared for every other status.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.completed_at = match (status, self.completed_at) {
            (TaskStatus::Completed, Some(at)) if self.status == TaskStatus::Completed => Some(at),
            (TaskStatus::Completed, _) => Some(now),
            _ => None,
        };
        self.status = status;
    }
}

/// Task columns as stored; ratings live in `task_ratings`
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub project: Option<String>,
    pub goal: Option<String>,
    pub notes: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub is_repeating: bool,
    pub repeat_interval: Option<RepeatInterval>,
    pub link: Option<String>,
    pub owner_id: Option<String>,
    pub priority_score: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub fn into_task(self, priority_ratings: PriorityRatings) -> Task {
        Task {
            id: self.id,
            title: self.title,
            project: self.project,
            goal: self.goal,
            notes: self.notes,
            task_type: self.task_type,
            status: self.status,
            due_date: self.due_date,
            is_repeating: self.is_repeating,
            repeat_interval: self.repeat_interval,
            link: self.link,
            owner_id: self.owner_id,
            priority_ratings,
            priority_score: self.priority_score,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Create task request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_repeating: bool,
    #[serde(default)]
    pub repeat_interval: Option<RepeatInterval>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub priority_ratings: PriorityRatings,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl From<&Task> for NewTask {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            project: task.project.clone(),
            goal: task.goal.clone(),
            notes: task.notes.clone(),
            task_type: task.task_type,
            status: task.status,
            due_date: task.due_date,
            is_repeating: task.is_repeating,
            repeat_interval: task.repeat_interval,
            link: task.link.clone(),
            priority_ratings: task.priority_ratings.clone(),
        }
    }
}

/// Update task request. `None` leaves a field unchanged; for optional
/// text fields an empty string clears the value. `due_date: Some(None)`
/// clears the due date.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub project: Option<String>,
    pub goal: Option<String>,
    pub notes: Option<String>,
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<NaiveDate>>,
    pub is_repeating: Option<bool>,
    pub repeat_interval: Option<RepeatInterval>,
    pub link: Option<String>,
    pub priority_ratings: Option<PriorityRatings>,
}

/// Filters for listing tasks. Results are always ordered by priority
/// score, highest first, then most recently updated.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub owner_id: Option<String>,
    pub project: Option<String>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    /// Case-insensitive match on title, goal and notes
    pub search: Option<String>,
    pub include_completed: bool,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn for_owner(owner_id: Option<&str>) -> Self {
        Self {
            owner_id: owner_id.map(str::to_string),
            include_completed: true,
            ..Self::default()
        }
    }
}

/// Backup record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Backup {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub size: i64,
    pub manifest_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: "t1".into(),
            title: "Write report".into(),
            project: None,
            goal: None,
            notes: None,
            task_type: TaskType::Work,
            status,
            due_date: None,
            is_repeating: false,
            repeat_interval: None,
            link: None,
            owner_id: None,
            priority_ratings: PriorityRatings::new(),
            priority_score: 0.0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_completed_at_follows_status() {
        let t0 = Utc::now();
        let mut t = task(TaskStatus::InProgress);

        t.set_status(TaskStatus::Completed, t0);
        assert_eq!(t.completed_at, Some(t0));

        // Re-saving a completed task keeps the original timestamp
        t.set_status(TaskStatus::Completed, t0 + chrono::Duration::hours(2));
        assert_eq!(t.completed_at, Some(t0));

        t.set_status(TaskStatus::OnHold, t0);
        assert_eq!(t.completed_at, None);
    }

    #[test]
    fn test_enum_parsing_is_lenient_about_spelling() {
        assert_eq!("In Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("not-started".parse::<TaskStatus>().unwrap(), TaskStatus::NotStarted);
        assert_eq!("WORK".parse::<TaskType>().unwrap(), TaskType::Work);
        assert_eq!("monthly".parse::<RepeatInterval>().unwrap(), RepeatInterval::Monthly);
        assert!("someday".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_category_scope_membership() {
        let default = Category::builder("impact", "Impact", 25).default_category().build();
        let mine = Category::builder("focus", "Focus", 0).owner("alice").build();

        assert!(default.in_scope_of(None));
        assert!(default.in_scope_of(Some("alice")));
        assert!(mine.in_scope_of(Some("alice")));
        assert!(!mine.in_scope_of(Some("bob")));
        assert!(!mine.in_scope_of(None));
    }
}
