//! Tasks service
//!
//! Task lifecycle on top of the repository. Every write recomputes the
//! cached priority score from the owner's category scope; the stored
//! score is never taken from input. The score is computed and stored
//! while holding the category write lock, so a concurrent weight change
//! either sees the task or is seen by it.

use crate::config::{MAX_GOAL_LENGTH, MAX_NOTES_LENGTH, MAX_PROJECT_LENGTH};
use super::categories::CategoryService;
use crate::database::{NewTask, Repository, Task, TaskPatch, TaskQuery, TaskStatus};
use crate::error::Result;
use crate::priority::validation::{
    validate_due_date, validate_link, validate_optional_text, validate_repeat, validate_title,
};
use crate::priority::{
    compute_score, score_breakdown, CategoryRegistry, PriorityRatings, Rating, ScoreBreakdown,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Which tasks to rescore after a weight change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescoreScope {
    /// Every task, after a default category changed
    All,
    /// Tasks of a single owner (`None` is the ownerless sandbox)
    Owner(Option<String>),
}

/// Service for managing tasks
#[derive(Clone)]
pub struct TaskService {
    repo: Repository,
    categories: CategoryService,
}

impl TaskService {
    pub fn new(repo: Repository, categories: CategoryService) -> Self {
        Self { repo, categories }
    }

    /// Create a new task owned by `owner_id`
    pub async fn create_task(&self, owner_id: Option<&str>, req: NewTask) -> Result<Task> {
        tracing::info!("Creating new task: {}", req.title);

        let task = build_task(owner_id, req, Utc::now())?;
        let task = self.insert_built(task).await?;

        tracing::info!("Task created successfully: {} (score {})", task.id, task.priority_score);

        Ok(task)
    }

    /// Score and store a task produced by `build_task`
    pub(crate) async fn insert_built(&self, mut task: Task) -> Result<Task> {
        let _guard = self.categories.lock_writes().await;
        self.rescore_one(&mut task, Utc::now()).await?;
        self.repo.insert_task(&task).await?;
        Ok(task)
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.repo.get_task(id).await
    }

    /// List tasks, highest priority first
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        self.repo.list_tasks(query).await
    }

    /// Project names in use by an owner
    pub async fn list_projects(&self, owner_id: Option<&str>) -> Result<Vec<String>> {
        self.repo.list_projects(owner_id).await
    }

    /// Update a task and recompute its score
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        tracing::debug!("Updating task: {}", id);

        let now = Utc::now();
        let mut task = self.repo.get_task(id).await?;

        if let Some(title) = patch.title {
            task.title = validate_title(&title)?;
        }
        if let Some(project) = patch.project {
            task.project = validate_optional_text("Project", Some(project), MAX_PROJECT_LENGTH)?;
        }
        if let Some(goal) = patch.goal {
            task.goal = validate_optional_text("Goal", Some(goal), MAX_GOAL_LENGTH)?;
        }
        if let Some(notes) = patch.notes {
            task.notes = validate_optional_text("Notes", Some(notes), MAX_NOTES_LENGTH)?;
        }
        if let Some(task_type) = patch.task_type {
            task.task_type = task_type;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = validate_due_date(due_date)?;
        }
        if let Some(link) = patch.link {
            task.link = validate_link(Some(link))?;
        }
        if let Some(ratings) = patch.priority_ratings {
            task.priority_ratings = ratings;
        }

        let is_repeating = patch.is_repeating.unwrap_or(task.is_repeating);
        let interval = patch.repeat_interval.or(task.repeat_interval);
        task.repeat_interval = validate_repeat(is_repeating, interval)?;
        task.is_repeating = is_repeating;

        if let Some(status) = patch.status {
            task.set_status(status, now);
        }

        task.updated_at = now;
        {
            let _guard = self.categories.lock_writes().await;
            self.rescore_one(&mut task, now).await?;
            self.repo.update_task(&task).await?;
        }

        tracing::debug!("Task updated successfully: {}", task.id);

        Ok(task)
    }

    /// Change only the status of a task
    pub async fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.update_task(
            id,
            TaskPatch {
                status: Some(status),
                ..TaskPatch::default()
            },
        )
        .await
    }

    /// Set or replace a single category rating
    pub async fn rate_task(&self, id: &str, category_id: &str, rating: Rating) -> Result<Task> {
        let mut ratings = self.repo.get_task(id).await?.priority_ratings;
        ratings.set(category_id, rating)?;

        self.update_task(
            id,
            TaskPatch {
                priority_ratings: Some(ratings),
                ..TaskPatch::default()
            },
        )
        .await
    }

    /// Replace all ratings of a task
    pub async fn set_ratings(&self, id: &str, ratings: PriorityRatings) -> Result<Task> {
        self.update_task(
            id,
            TaskPatch {
                priority_ratings: Some(ratings),
                ..TaskPatch::default()
            },
        )
        .await
    }

    /// Delete a task
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting task: {}", id);

        self.repo.delete_task(id).await?;

        tracing::info!("Task deleted successfully: {}", id);

        Ok(())
    }

    /// How the current score of a task is put together, as of now
    pub async fn explain_score(&self, id: &str) -> Result<ScoreBreakdown> {
        let task = self.repo.get_task(id).await?;
        let registry = CategoryRegistry::new(self.repo.list_categories().await?);
        let scope = registry.scope_categories(task.owner_id.as_deref());

        Ok(score_breakdown(
            &task.priority_ratings,
            &scope,
            task.due_date,
            Utc::now(),
        ))
    }

    /// Recompute stored scores, e.g. after category weights changed or
    /// as time moves due dates into a new urgency tier
    pub async fn rescore(&self, scope: RescoreScope) -> Result<usize> {
        rescore_tasks(&self.repo, scope, Utc::now()).await
    }

    async fn rescore_one(&self, task: &mut Task, now: DateTime<Utc>) -> Result<()> {
        let registry = CategoryRegistry::new(self.repo.list_categories().await?);
        let scope = registry.scope_categories(task.owner_id.as_deref());
        task.priority_score = compute_score(&task.priority_ratings, &scope, task.due_date, now);
        Ok(())
    }
}

/// Validate a create request into a task that is not stored yet. The
/// score is left at zero until the task is inserted.
pub(crate) fn build_task(owner_id: Option<&str>, req: NewTask, now: DateTime<Utc>) -> Result<Task> {
    let mut task = Task {
        id: Uuid::new_v4().to_string(),
        title: validate_title(&req.title)?,
        project: validate_optional_text("Project", req.project, MAX_PROJECT_LENGTH)?,
        goal: validate_optional_text("Goal", req.goal, MAX_GOAL_LENGTH)?,
        notes: validate_optional_text("Notes", req.notes, MAX_NOTES_LENGTH)?,
        task_type: req.task_type,
        status: TaskStatus::NotStarted,
        due_date: validate_due_date(req.due_date)?,
        is_repeating: req.is_repeating,
        repeat_interval: validate_repeat(req.is_repeating, req.repeat_interval)?,
        link: validate_link(req.link)?,
        owner_id: owner_id.map(str::to_string),
        priority_ratings: req.priority_ratings,
        priority_score: 0.0,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    task.set_status(req.status, now);
    Ok(task)
}

/// Recompute and store the scores of the tasks in `scope`
pub(crate) async fn rescore_tasks(
    repo: &Repository,
    scope: RescoreScope,
    now: DateTime<Utc>,
) -> Result<usize> {
    let registry = CategoryRegistry::new(repo.list_categories().await?);

    let tasks = match &scope {
        RescoreScope::All => repo.list_all_tasks().await?,
        RescoreScope::Owner(owner) => repo.list_tasks(&TaskQuery::for_owner(owner.as_deref())).await?,
    };

    let scores: Vec<(String, f64)> = tasks
        .iter()
        .filter_map(|task| {
            let categories = registry.scope_categories(task.owner_id.as_deref());
            let score = compute_score(&task.priority_ratings, &categories, task.due_date, now);
            (score != task.priority_score).then(|| (task.id.clone(), score))
        })
        .collect();

    repo.update_scores(&scores).await?;

    tracing::debug!("Rescored {} of {} tasks ({:?})", scores.len(), tasks.len(), scope);

    Ok(scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, Category, RepeatInterval, TaskType};
    use crate::error::AppError;
    use crate::priority::default_categories;
    use chrono::{Duration, NaiveDate};

    async fn create_test_service() -> (TaskService, Repository) {
        let pool = create_memory_pool().await.unwrap();
        let repo = Repository::new(pool);
        repo.seed_default_categories(&default_categories(Utc::now()), false)
            .await
            .unwrap();
        let categories = CategoryService::new(repo.clone());
        (TaskService::new(repo.clone(), categories), repo)
    }

    fn rated(title: &str, pairs: &[(&str, i64)]) -> NewTask {
        NewTask {
            priority_ratings: PriorityRatings::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
                .unwrap(),
            ..NewTask::titled(title)
        }
    }

    #[tokio::test]
    async fn test_create_computes_score() {
        let (service, _repo) = create_test_service().await;

        let task = service
            .create_task(None, rated("Plan sprint", &[("impact", 4)]))
            .await
            .unwrap();

        assert_eq!(task.priority_score, 100.0);

        let fetched = service.get_task(&task.id).await.unwrap();
        assert_eq!(fetched.priority_score, 100.0);
    }

    #[tokio::test]
    async fn test_due_soon_adds_urgency_bonus() {
        let (service, _repo) = create_test_service().await;
        let tomorrow = (Utc::now() + Duration::days(1)).date_naive();

        let task = service
            .create_task(
                None,
                NewTask {
                    due_date: Some(tomorrow),
                    ..rated("Pay rent", &[("impact", 4)])
                },
            )
            .await
            .unwrap();

        assert_eq!(task.priority_score, 120.0);
    }

    #[tokio::test]
    async fn test_unrated_task_scores_zero() {
        let (service, _repo) = create_test_service().await;

        let task = service
            .create_task(None, NewTask::titled("Someday maybe"))
            .await
            .unwrap();

        assert_eq!(task.priority_score, 0.0);
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let (service, _repo) = create_test_service().await;

        let blank = service.create_task(None, NewTask::titled("   ")).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let repeating = service
            .create_task(
                None,
                NewTask {
                    is_repeating: true,
                    ..NewTask::titled("Water plants")
                },
            )
            .await;
        assert!(matches!(repeating, Err(AppError::Validation(_))));

        let ancient = service
            .create_task(
                None,
                NewTask {
                    due_date: NaiveDate::from_ymd_opt(1990, 1, 1),
                    ..NewTask::titled("Time travel")
                },
            )
            .await;
        assert!(matches!(ancient, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rescores() {
        let (service, _repo) = create_test_service().await;
        let task = service
            .create_task(None, rated("Refactor", &[("impact", 2)]))
            .await
            .unwrap();
        assert_eq!(task.priority_score, 50.0);

        let updated = service
            .rate_task(&task.id, "urgency", Rating::new(5).unwrap())
            .await
            .unwrap();

        // 2*25 + 5*20
        assert_eq!(updated.priority_score, 150.0);
        assert_eq!(updated.priority_ratings.len(), 2);
    }

    #[tokio::test]
    async fn test_status_transitions_set_completed_at() {
        let (service, _repo) = create_test_service().await;
        let task = service
            .create_task(None, NewTask::titled("Book dentist"))
            .await
            .unwrap();
        assert!(task.completed_at.is_none());

        let done = service.set_status(&task.id, TaskStatus::Completed).await.unwrap();
        assert!(done.completed_at.is_some());

        let reopened = service.set_status(&task.id, TaskStatus::InProgress).await.unwrap();
        assert!(reopened.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_created_completed_has_timestamp() {
        let (service, _repo) = create_test_service().await;
        let task = service
            .create_task(
                None,
                NewTask {
                    status: TaskStatus::Completed,
                    ..NewTask::titled("Already done")
                },
            )
            .await
            .unwrap();

        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_turning_off_repeat_drops_interval() {
        let (service, _repo) = create_test_service().await;
        let task = service
            .create_task(
                None,
                NewTask {
                    is_repeating: true,
                    repeat_interval: Some(RepeatInterval::Weekly),
                    task_type: TaskType::Health,
                    ..NewTask::titled("Gym")
                },
            )
            .await
            .unwrap();
        assert_eq!(task.repeat_interval, Some(RepeatInterval::Weekly));

        let updated = service
            .update_task(
                &task.id,
                TaskPatch {
                    is_repeating: Some(false),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_repeating);
        assert_eq!(updated.repeat_interval, None);
    }

    #[tokio::test]
    async fn test_owner_categories_count_only_for_owner() {
        let (service, repo) = create_test_service().await;
        // Make room in alice's scope
        let mut risk = repo
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "risk")
            .unwrap();
        risk.weight = 0;
        repo.update_category(&risk).await.unwrap();
        repo.insert_category(&Category::builder("focus", "Focus", 5).owner("alice").build())
            .await
            .unwrap();

        let ratings = [("focus", 4)];
        let alice = service.create_task(Some("alice"), rated("A", &ratings)).await.unwrap();
        let bob = service.create_task(Some("bob"), rated("B", &ratings)).await.unwrap();

        assert_eq!(alice.priority_score, 20.0);
        assert_eq!(bob.priority_score, 0.0);
    }

    #[tokio::test]
    async fn test_rescore_after_weight_change() {
        let (service, repo) = create_test_service().await;
        let task = service
            .create_task(None, rated("Draft proposal", &[("impact", 4)]))
            .await
            .unwrap();
        assert_eq!(task.priority_score, 100.0);

        let mut impact = repo
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "impact")
            .unwrap();
        impact.weight = 10;
        repo.update_category(&impact).await.unwrap();

        let changed = service.rescore(RescoreScope::All).await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(service.get_task(&task.id).await.unwrap().priority_score, 40.0);
    }

    #[tokio::test]
    async fn test_explain_score() {
        let (service, _repo) = create_test_service().await;
        let task = service
            .create_task(None, rated("Explain me", &[("impact", 1), ("urgency", 1)]))
            .await
            .unwrap();

        let breakdown = service.explain_score(&task.id).await.unwrap();
        assert_eq!(breakdown.weighted_sum, 45);
        assert_eq!(breakdown.total_weight, 100);
        assert_eq!(breakdown.bonus, 0.0);
    }

    #[tokio::test]
    async fn test_delete_task() {
        let (service, _repo) = create_test_service().await;
        let task = service.create_task(None, NewTask::titled("Gone")).await.unwrap();

        service.delete_task(&task.id).await.unwrap();

        assert!(matches!(
            service.get_task(&task.id).await,
            Err(AppError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_scores_against_weights_written_before_it() {
        let (service, repo) = create_test_service().await;

        let guard = service.categories.lock_writes().await;
        let pending = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .create_task(None, rated("Queued", &[("impact", 4)]))
                    .await
            }
        });

        // A weight write lands while the create waits for the lock
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        let mut impact = repo
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "impact")
            .unwrap();
        impact.weight = 15;
        repo.update_category(&impact).await.unwrap();
        drop(guard);

        let task = pending.await.unwrap().unwrap();
        assert_eq!(task.priority_score, 60.0);
        assert_eq!(repo.get_task(&task.id).await.unwrap().priority_score, 60.0);
    }

    #[tokio::test]
    async fn test_list_projects() {
        let (service, _repo) = create_test_service().await;
        for project in ["Home", "Work", "Home"] {
            service
                .create_task(
                    Some("alice"),
                    NewTask {
                        project: Some(project.to_string()),
                        ..NewTask::titled("t")
                    },
                )
                .await
                .unwrap();
        }

        let projects = service.list_projects(Some("alice")).await.unwrap();
        assert_eq!(projects, vec!["Home".to_string(), "Work".to_string()]);
    }
}
