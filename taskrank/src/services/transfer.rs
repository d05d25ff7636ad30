//! Import and export
//!
//! Moves an owner's custom categories and tasks in and out as JSON, and
//! migrates task lists kept by the old browser-storage frontend.
//! Everything imported goes through the same services as interactive
//! writes, so the weight rules and score computation apply unchanged.

use super::categories::CategoryService;
use super::tasks::{build_task, TaskService};
use crate::config::EXPORT_FORMAT_VERSION;
use crate::database::{
    Category, NewCategory, NewTask, RepeatInterval, Repository, Task, TaskQuery, TaskStatus,
    TaskType,
};
use crate::error::{AppError, Result};
use crate::priority::{CategoryRegistry, PriorityRatings, Rating};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Portable snapshot of one owner's data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub owner_id: Option<String>,
    /// The owner's custom categories; defaults are never exported
    pub categories: Vec<Category>,
    pub tasks: Vec<Task>,
}

impl ExportBundle {
    /// Parse a bundle, refusing formats newer than this build understands
    pub fn from_json(json: &str) -> Result<Self> {
        let bundle: ExportBundle = serde_json::from_str(json)?;
        if bundle.format_version > EXPORT_FORMAT_VERSION {
            return Err(AppError::Validation(format!(
                "Unsupported export format version {} (newest supported is {})",
                bundle.format_version, EXPORT_FORMAT_VERSION
            )));
        }
        Ok(bundle)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep existing data and add the imported items
    #[default]
    Merge,
    /// Delete the owner's tasks before importing. Tasks are validated
    /// first; if none of the offered tasks is valid nothing is deleted.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedKind {
    Category,
    Task,
}

/// An item that was not imported, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub kind: SkippedKind,
    /// Category id, or task title (position when untitled)
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub categories_imported: usize,
    pub tasks_imported: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Tasks recovered from a legacy export
#[derive(Debug, Clone, Default)]
pub struct LegacyTasks {
    pub tasks: Vec<NewTask>,
    pub skipped: Vec<SkippedItem>,
}

/// Service for moving data in and out
#[derive(Clone)]
pub struct TransferService {
    repo: Repository,
    categories: CategoryService,
    tasks: TaskService,
}

impl TransferService {
    pub fn new(repo: Repository, categories: CategoryService, tasks: TaskService) -> Self {
        Self {
            repo,
            categories,
            tasks,
        }
    }

    /// Snapshot an owner's custom categories and tasks
    pub async fn export_owner(&self, owner_id: Option<&str>) -> Result<ExportBundle> {
        tracing::info!("Exporting data for owner {:?}", owner_id);

        let registry = CategoryRegistry::new(self.repo.list_categories().await?);
        let categories: Vec<Category> = registry
            .scope(owner_id)
            .into_iter()
            .filter(|c| !c.is_default)
            .cloned()
            .collect();
        let tasks = self.repo.list_tasks(&TaskQuery::for_owner(owner_id)).await?;

        tracing::info!(
            "Exported {} categories and {} tasks",
            categories.len(),
            tasks.len()
        );

        Ok(ExportBundle {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            owner_id: owner_id.map(str::to_string),
            categories,
            tasks,
        })
    }

    /// Export as pretty-printed JSON
    pub async fn export_json(&self, owner_id: Option<&str>) -> Result<String> {
        let bundle = self.export_owner(owner_id).await?;
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    /// Import a bundle into `owner_id`'s scope.
    ///
    /// Tasks are validated before anything is written. Categories are
    /// stored next so imported tasks are scored against them. Rejected
    /// items are reported and the rest of the bundle continues. Tasks keep
    /// their original creation time, and completed tasks their completion
    /// time.
    pub async fn import_bundle(
        &self,
        owner_id: Option<&str>,
        bundle: ExportBundle,
        mode: ImportMode,
    ) -> Result<ImportReport> {
        tracing::info!(
            "Importing {} categories and {} tasks for owner {:?} ({:?})",
            bundle.categories.len(),
            bundle.tasks.len(),
            owner_id,
            mode
        );

        let mut task_skips = Vec::new();
        let tasks = build_imported(
            owner_id,
            bundle.tasks.iter().map(|t| (NewTask::from(t), Some(t))),
            &mut task_skips,
        )?;

        if mode == ImportMode::Replace {
            self.replace_owner_tasks(owner_id, bundle.tasks.len(), tasks.len())
                .await?;
        }

        let mut report = ImportReport::default();

        for category in &bundle.categories {
            let req = NewCategory {
                is_default: false,
                ..NewCategory::from(category)
            };
            match self.categories.create(owner_id, req).await {
                Ok(_) => report.categories_imported += 1,
                Err(e) if e.is_rule_violation() => {
                    tracing::warn!("Skipping category {}: {}", category.id, e);
                    report.skipped.push(SkippedItem {
                        kind: SkippedKind::Category,
                        key: category.id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        report.skipped.extend(task_skips);
        self.insert_tasks(tasks, &mut report).await?;

        tracing::info!(
            "Import finished: {} categories, {} tasks, {} skipped",
            report.categories_imported,
            report.tasks_imported,
            report.skipped.len()
        );

        Ok(report)
    }

    /// Import a legacy task list into `owner_id`'s scope
    pub async fn import_legacy(
        &self,
        owner_id: Option<&str>,
        json: &str,
        mode: ImportMode,
    ) -> Result<ImportReport> {
        let legacy = parse_legacy_tasks(json)?;
        tracing::info!(
            "Importing {} legacy tasks ({} unreadable)",
            legacy.tasks.len(),
            legacy.skipped.len()
        );

        let offered = legacy.tasks.len() + legacy.skipped.len();
        let mut report = ImportReport {
            skipped: legacy.skipped,
            ..ImportReport::default()
        };
        let tasks = build_imported(
            owner_id,
            legacy.tasks.into_iter().map(|t| (t, None)),
            &mut report.skipped,
        )?;

        if mode == ImportMode::Replace {
            self.replace_owner_tasks(owner_id, offered, tasks.len()).await?;
        }

        self.insert_tasks(tasks, &mut report).await?;

        Ok(report)
    }

    async fn replace_owner_tasks(
        &self,
        owner_id: Option<&str>,
        offered: usize,
        valid: usize,
    ) -> Result<()> {
        if offered > 0 && valid == 0 {
            return Err(AppError::Validation(format!(
                "None of the {} tasks can be imported; existing tasks were kept",
                offered
            )));
        }

        let removed = self.repo.delete_tasks_for_owner(owner_id).await?;
        tracing::info!("Removed {} existing tasks before import", removed);
        Ok(())
    }

    async fn insert_tasks(&self, tasks: Vec<Task>, report: &mut ImportReport) -> Result<()> {
        for task in tasks {
            self.tasks.insert_built(task).await?;
            report.tasks_imported += 1;
        }
        Ok(())
    }
}

/// Validate incoming tasks. Invalid ones land in `skipped`; a task with a
/// source record keeps its creation and completion times.
fn build_imported<'a, I>(
    owner_id: Option<&str>,
    items: I,
    skipped: &mut Vec<SkippedItem>,
) -> Result<Vec<Task>>
where
    I: IntoIterator<Item = (NewTask, Option<&'a Task>)>,
{
    let now = Utc::now();
    let mut tasks = Vec::new();

    for (req, source) in items {
        let title = req.title.clone();
        match build_task(owner_id, req, now) {
            Ok(mut task) => {
                if let Some(source) = source {
                    task.created_at = source.created_at;
                    if task.status == TaskStatus::Completed && source.completed_at.is_some() {
                        task.completed_at = source.completed_at;
                    }
                }
                tasks.push(task);
            }
            Err(AppError::Validation(reason)) => {
                tracing::warn!("Skipping task {:?}: {}", title, reason);
                skipped.push(SkippedItem {
                    kind: SkippedKind::Task,
                    key: title,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(tasks)
}

/// Task as stored by the browser frontend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    title: Option<String>,
    project: Option<String>,
    goal: Option<String>,
    notes: Option<String>,
    #[serde(rename = "type")]
    task_type: Option<String>,
    status: Option<String>,
    due_date: Option<String>,
    is_repeating: Option<bool>,
    repeat_interval: Option<String>,
    link: Option<String>,
    #[serde(alias = "priorityRatings")]
    priorities: Option<Map<String, Value>>,
}

/// Read a legacy export: either a bare array of tasks or an object with a
/// `tasks` array. Tasks that can't be converted are reported, not fixed up.
pub fn parse_legacy_tasks(json: &str) -> Result<LegacyTasks> {
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AppError::Validation(
                    "Legacy export has no tasks array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::Validation(
                "Legacy export must be an array or an object with tasks".to_string(),
            ))
        }
    };

    let mut parsed = LegacyTasks::default();
    for (index, item) in items.into_iter().enumerate() {
        let fallback_key = format!("#{}", index + 1);
        let key = item
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback_key);

        let result = serde_json::from_value::<LegacyTask>(item)
            .map_err(AppError::from)
            .and_then(convert_legacy_task);

        match result {
            Ok(task) => parsed.tasks.push(task),
            Err(e) => parsed.skipped.push(SkippedItem {
                kind: SkippedKind::Task,
                key,
                reason: e.to_string(),
            }),
        }
    }

    Ok(parsed)
}

fn convert_legacy_task(legacy: LegacyTask) -> Result<NewTask> {
    let is_repeating = legacy.is_repeating.unwrap_or(false);

    let task_type = non_empty(legacy.task_type)
        .map(|s| s.parse::<TaskType>())
        .transpose()?
        .unwrap_or_default();
    let status = non_empty(legacy.status)
        .map(|s| s.parse::<TaskStatus>())
        .transpose()?
        .unwrap_or_default();
    // Old records keep a stale interval after repeating was switched off
    let repeat_interval = if is_repeating {
        non_empty(legacy.repeat_interval)
            .map(|s| s.parse::<RepeatInterval>())
            .transpose()?
    } else {
        None
    };

    Ok(NewTask {
        title: legacy.title.unwrap_or_default(),
        project: legacy.project,
        goal: legacy.goal,
        notes: legacy.notes,
        task_type,
        status,
        due_date: non_empty(legacy.due_date)
            .map(|s| parse_legacy_date(&s))
            .transpose()?,
        is_repeating,
        repeat_interval,
        link: non_empty(legacy.link),
        priority_ratings: normalize_ratings(legacy.priorities.unwrap_or_default())?,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_legacy_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| AppError::Validation(format!("Invalid due date: {:?}", s)))
}

/// Ratings arrive as numbers or numeric strings
fn normalize_ratings(raw: Map<String, Value>) -> Result<PriorityRatings> {
    let mut ratings = PriorityRatings::new();
    for (category_id, value) in raw {
        let number = match &value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let number = number.ok_or_else(|| {
            AppError::Validation(format!(
                "Rating for {} must be a whole number, got {}",
                category_id, value
            ))
        })?;
        ratings.set(category_id, Rating::new(number)?)?;
    }
    Ok(ratings)
}
