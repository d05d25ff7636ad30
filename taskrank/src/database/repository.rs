//! Repository layer for database operations
//!
//! This module provides CRUD operations for all entities.
//! Multi-row writes (a task with its ratings, bulk weight changes,
//! default reseeding, restores) run inside a single transaction.

use super::models::*;
use crate::error::{AppError, Result};
use crate::priority::{PriorityRatings, Rating};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ===== Categories =====

    /// Every stored category, defaults first then by owner and id
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            ORDER BY is_default DESC, owner_id ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    pub async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_category_on(&mut conn, category).await?;

        tracing::debug!("Created category: {} (owner {:?})", category.id, category.owner_id);
        Ok(())
    }

    /// Overwrite a category's mutable fields, matched by id and owner
    pub async fn update_category(&self, category: &Category) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let rows = update_category_on(&mut conn, category).await?;

        if rows == 0 {
            return Err(AppError::CategoryNotFound(category.id.clone()));
        }

        tracing::debug!("Updated category: {}", category.id);
        Ok(())
    }

    /// Apply several category updates atomically
    pub async fn update_categories(&self, categories: &[Category]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for category in categories {
            if update_category_on(&mut tx, category).await? == 0 {
                return Err(AppError::CategoryNotFound(category.id.clone()));
            }
        }

        tx.commit().await?;

        tracing::debug!("Updated {} categories", categories.len());
        Ok(())
    }

    pub async fn delete_category(&self, owner_id: Option<&str>, id: &str) -> Result<()> {
        let rows = sqlx::query(
            r#"
            DELETE FROM categories WHERE id = ? AND owner_id IS ? AND is_default = 0
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::CategoryNotFound(id.to_string()));
        }

        tracing::debug!("Deleted category: {}", id);
        Ok(())
    }

    /// Insert a set of default categories in one transaction, optionally
    /// removing the existing defaults first.
    pub async fn seed_default_categories(
        &self,
        defaults: &[Category],
        replace_existing: bool,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if replace_existing {
            let removed = sqlx::query("DELETE FROM categories WHERE is_default = 1")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tracing::debug!("Removed {} default categories", removed);
        }

        for category in defaults {
            insert_category_on(&mut tx, category).await?;
        }

        tx.commit().await?;

        Ok(defaults.len() as u64)
    }

    /// Number of tasks of `owner_id` that rate the category `category_id`
    pub async fn count_tasks_rating(&self, owner_id: Option<&str>, category_id: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT r.task_id)
            FROM task_ratings r
            JOIN tasks t ON t.id = r.task_id
            WHERE r.category_id = ? AND t.owner_id IS ?
            "#,
        )
        .bind(category_id)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    // ===== Tasks =====

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_task_on(&mut tx, task).await?;
        tx.commit().await?;

        tracing::debug!("Created task: {}", task.id);
        Ok(())
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))?;

        let mut ratings = self.load_ratings(&[row.id.clone()]).await?;
        let task_ratings = ratings.remove(&row.id).unwrap_or_default();

        Ok(row.into_task(task_ratings))
    }

    /// List tasks matching `query`, highest score first, then most
    /// recently updated
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM tasks WHERE owner_id IS ");
        builder.push_bind(query.owner_id.clone());

        if let Some(project) = &query.project {
            builder.push(" AND project = ").push_bind(project.clone());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        } else if !query.include_completed {
            builder
                .push(" AND status != ")
                .push_bind(TaskStatus::Completed);
        }
        if let Some(task_type) = query.task_type {
            builder.push(" AND task_type = ").push_bind(task_type);
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim().to_lowercase());
            builder
                .push(" AND (LOWER(title) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(goal, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(notes, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        builder.push(" ORDER BY priority_score DESC, updated_at DESC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder
            .build_query_as::<TaskRow>()
            .fetch_all(&self.pool)
            .await?;

        self.attach_ratings(rows).await
    }

    /// Every task regardless of owner
    pub async fn list_all_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT * FROM tasks ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.attach_ratings(rows).await
    }

    /// Distinct non-empty project names of an owner, alphabetical
    pub async fn list_projects(&self, owner_id: Option<&str>) -> Result<Vec<String>> {
        let projects: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT project FROM tasks
            WHERE owner_id IS ? AND project IS NOT NULL
            ORDER BY project ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }

    /// Owners that have at least one task
    pub async fn list_task_owners(&self) -> Result<Vec<String>> {
        let owners: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT owner_id FROM tasks WHERE owner_id IS NOT NULL ORDER BY owner_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(owners)
    }

    /// Replace a task row and its ratings
    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            UPDATE tasks SET
                title = ?, project = ?, goal = ?, notes = ?, task_type = ?, status = ?,
                due_date = ?, is_repeating = ?, repeat_interval = ?, link = ?,
                priority_score = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.project)
        .bind(&task.goal)
        .bind(&task.notes)
        .bind(task.task_type)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.is_repeating)
        .bind(task.repeat_interval)
        .bind(&task.link)
        .bind(task.priority_score)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .bind(&task.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::TaskNotFound(task.id.clone()));
        }

        replace_ratings_on(&mut tx, &task.id, &task.priority_ratings).await?;

        tx.commit().await?;

        tracing::debug!("Updated task: {}", task.id);
        Ok(())
    }

    /// Store recomputed scores without touching `updated_at`
    pub async fn update_scores(&self, scores: &[(String, f64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (id, score) in scores {
            sqlx::query("UPDATE tasks SET priority_score = ? WHERE id = ?")
                .bind(score)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_ratings WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::TaskNotFound(id.to_string()));
        }

        tx.commit().await?;

        tracing::debug!("Deleted task: {}", id);
        Ok(())
    }

    /// Delete every task of an owner, returning how many were removed
    pub async fn delete_tasks_for_owner(&self, owner_id: Option<&str>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM task_ratings
            WHERE task_id IN (SELECT id FROM tasks WHERE owner_id IS ?)
            "#,
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query("DELETE FROM tasks WHERE owner_id IS ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::debug!("Deleted {} tasks for owner {:?}", rows, owner_id);
        Ok(rows)
    }

    async fn attach_ratings(&self, rows: Vec<TaskRow>) -> Result<Vec<Task>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut ratings = self.load_ratings(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let task_ratings = ratings.remove(&row.id).unwrap_or_default();
                row.into_task(task_ratings)
            })
            .collect())
    }

    async fn load_ratings(&self, task_ids: &[String]) -> Result<HashMap<String, PriorityRatings>> {
        let mut by_task: HashMap<String, PriorityRatings> = HashMap::new();
        if task_ids.is_empty() {
            return Ok(by_task);
        }

        // Stay well below SQLite's bound-parameter limit
        for chunk in task_ids.chunks(500) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT task_id, category_id, rating FROM task_ratings WHERE task_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, String, i64)> =
                builder.build_query_as().fetch_all(&self.pool).await?;

            for (task_id, category_id, rating) in rows {
                by_task
                    .entry(task_id)
                    .or_default()
                    .set(category_id, Rating::new(rating)?)?;
            }
        }

        Ok(by_task)
    }

    // ===== Snapshots =====

    /// Replace every category and task in one transaction
    pub async fn replace_all(&self, categories: &[Category], tasks: &[Task]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_ratings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?;

        for category in categories {
            insert_category_on(&mut tx, category).await?;
        }
        for task in tasks {
            insert_task_on(&mut tx, task).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Replaced store contents: {} categories, {} tasks",
            categories.len(),
            tasks.len()
        );
        Ok(())
    }

    // ===== Backups =====

    /// Record a backup
    pub async fn record_backup(&self, path: &str, size: i64, manifest_hash: &str) -> Result<Backup> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let backup = sqlx::query_as::<_, Backup>(
            r#"
            INSERT INTO backups (id, timestamp, path, size, manifest_hash)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(now)
        .bind(path)
        .bind(size)
        .bind(manifest_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Recorded backup: {}", id);
        Ok(backup)
    }

    /// List backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<Backup>> {
        let backups = sqlx::query_as::<_, Backup>(
            r#"
            SELECT * FROM backups ORDER BY timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(backups)
    }
}

async fn insert_category_on(conn: &mut SqliteConnection, category: &Category) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO categories
            (id, display_name, secondary_name, weight, color, is_default, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.id)
    .bind(&category.display_name)
    .bind(&category.secondary_name)
    .bind(category.weight)
    .bind(&category.color)
    .bind(category.is_default)
    .bind(&category.owner_id)
    .bind(category.created_at)
    .bind(category.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

async fn update_category_on(conn: &mut SqliteConnection, category: &Category) -> Result<u64> {
    let rows = sqlx::query(
        r#"
        UPDATE categories
        SET display_name = ?, secondary_name = ?, weight = ?, color = ?, updated_at = ?
        WHERE id = ? AND owner_id IS ? AND is_default = ?
        "#,
    )
    .bind(&category.display_name)
    .bind(&category.secondary_name)
    .bind(category.weight)
    .bind(&category.color)
    .bind(category.updated_at)
    .bind(&category.id)
    .bind(&category.owner_id)
    .bind(category.is_default)
    .execute(conn)
    .await?
    .rows_affected();

    Ok(rows)
}

async fn insert_task_on(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, title, project, goal, notes, task_type, status, due_date, is_repeating,
             repeat_interval, link, owner_id, priority_score, completed_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.project)
    .bind(&task.goal)
    .bind(&task.notes)
    .bind(task.task_type)
    .bind(task.status)
    .bind(task.due_date)
    .bind(task.is_repeating)
    .bind(task.repeat_interval)
    .bind(&task.link)
    .bind(&task.owner_id)
    .bind(task.priority_score)
    .bind(task.completed_at)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *conn)
    .await?;

    replace_ratings_on(conn, &task.id, &task.priority_ratings).await
}

async fn replace_ratings_on(
    conn: &mut SqliteConnection,
    task_id: &str,
    ratings: &PriorityRatings,
) -> Result<()> {
    sqlx::query("DELETE FROM task_ratings WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;

    for (category_id, rating) in ratings.iter() {
        sqlx::query("INSERT INTO task_ratings (task_id, category_id, rating) VALUES (?, ?, ?)")
            .bind(task_id)
            .bind(category_id)
            .bind(rating.value())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}
