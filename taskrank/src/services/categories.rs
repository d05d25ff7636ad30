//! Categories service
//!
//! Persists category changes decided by `CategoryRegistry`. Each write
//! loads the current categories, validates against them and stores the
//! result while holding a single write lock, so the weight check can't
//! race another write. Writes that change weights rescore the tasks in
//! the affected scope.

use super::tasks::{rescore_tasks, RescoreScope};
use crate::database::{Category, CategoryPatch, NewCategory, Repository};
use crate::error::Result;
use crate::priority::{ensure_unused, CategoryRegistry, ScopeWeightReport};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Result of a bulk weight change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkWeightOutcome {
    pub updated: Vec<String>,
    /// Requested ids not found in the scope
    pub skipped: Vec<String>,
    pub total_weight: u32,
}

/// Service for managing priority categories
#[derive(Clone)]
pub struct CategoryService {
    repo: Repository,
    write_lock: Arc<Mutex<()>>,
}

impl CategoryService {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Hold off category writes, e.g. while a restore swaps the store
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    async fn registry(&self) -> Result<CategoryRegistry> {
        Ok(CategoryRegistry::new(self.repo.list_categories().await?))
    }

    /// Global defaults, ordered by id
    pub async fn list_defaults(&self) -> Result<Vec<Category>> {
        let registry = self.registry().await?;
        Ok(registry.defaults().into_iter().cloned().collect())
    }

    /// Defaults plus the owner's categories, defaults first
    pub async fn list_for_owner(&self, owner_id: Option<&str>) -> Result<Vec<Category>> {
        let registry = self.registry().await?;
        Ok(registry.scope_categories(owner_id))
    }

    /// Create a category in `owner_id`'s scope
    pub async fn create(&self, owner_id: Option<&str>, req: NewCategory) -> Result<Category> {
        tracing::info!("Creating category: {} (owner {:?})", req.id, owner_id);

        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        let category = registry.check_create(owner_id, &req, Utc::now())?;
        self.repo.insert_category(&category).await?;

        if category.weight > 0 {
            self.rescore_for(&category).await?;
        }

        tracing::info!("Category created successfully: {}", category.id);

        Ok(category)
    }

    /// Update a category visible in `owner_id`'s scope
    pub async fn update(
        &self,
        owner_id: Option<&str>,
        id: &str,
        patch: CategoryPatch,
    ) -> Result<Category> {
        tracing::debug!("Updating category: {}", id);

        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        let previous_weight = registry.find(owner_id, id).map(|c| c.weight);
        let category = registry.check_update(owner_id, id, &patch, Utc::now())?;
        self.repo.update_category(&category).await?;

        if previous_weight != Some(category.weight) {
            self.rescore_for(&category).await?;
        }

        tracing::debug!("Category updated successfully: {}", category.id);

        Ok(category)
    }

    /// Delete a custom category that no task rates
    pub async fn delete(&self, owner_id: Option<&str>, id: &str) -> Result<()> {
        tracing::info!("Deleting category: {}", id);

        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        let category = registry.check_delete(owner_id, id)?;
        let usage = self
            .repo
            .count_tasks_rating(category.owner_id.as_deref(), &category.id)
            .await?;
        ensure_unused(category, usage)?;

        self.repo
            .delete_category(category.owner_id.as_deref(), &category.id)
            .await?;

        tracing::info!("Category deleted successfully: {}", id);

        Ok(())
    }

    /// Set several weights at once. The whole change is validated before
    /// anything is written and applied in one transaction.
    pub async fn bulk_set_weights(
        &self,
        owner_id: Option<&str>,
        weights: BTreeMap<String, u32>,
    ) -> Result<BulkWeightOutcome> {
        tracing::info!("Setting {} category weights (owner {:?})", weights.len(), owner_id);

        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        let plan = registry.check_bulk_weights(owner_id, &weights, Utc::now())?;
        self.repo.update_categories(&plan.updates).await?;

        if !plan.skipped.is_empty() {
            tracing::warn!("Skipped unknown categories: {:?}", plan.skipped);
        }

        let scope = if plan.updates.iter().any(|c| c.is_default) {
            RescoreScope::All
        } else {
            RescoreScope::Owner(owner_id.map(str::to_string))
        };
        rescore_tasks(&self.repo, scope, Utc::now()).await?;

        Ok(BulkWeightOutcome {
            updated: plan.updates.into_iter().map(|c| c.id).collect(),
            skipped: plan.skipped,
            total_weight: plan.total_weight,
        })
    }

    /// Seed the canonical defaults if there are none. Returns how many
    /// categories were inserted.
    pub async fn initialize_defaults(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        let seed = registry.check_seed_defaults(Utc::now())?;
        if seed.is_empty() {
            tracing::debug!("Default categories already present");
            return Ok(0);
        }

        self.repo.seed_default_categories(&seed, false).await?;
        rescore_tasks(&self.repo, RescoreScope::All, Utc::now()).await?;

        tracing::info!("Seeded {} default categories", seed.len());
        Ok(seed.len())
    }

    /// Drop every default category and seed the canonical set again
    pub async fn reset_defaults(&self) -> Result<usize> {
        tracing::info!("Resetting default categories");

        let _guard = self.write_lock.lock().await;
        let registry = self.registry().await?;

        // Validate the reseed against what remains before deleting anything
        let seed = registry.without_defaults().check_seed_defaults(Utc::now())?;

        self.repo.seed_default_categories(&seed, true).await?;
        rescore_tasks(&self.repo, RescoreScope::All, Utc::now()).await?;

        tracing::info!("Default categories reset ({} seeded)", seed.len());
        Ok(seed.len())
    }

    /// Read-only weight report for every scope
    pub async fn validate_weights(&self) -> Result<Vec<ScopeWeightReport>> {
        let registry = self.registry().await?;
        let task_owners = self.repo.list_task_owners().await?;

        let reports = registry.weight_reports(task_owners.iter().map(String::as_str));
        for report in reports.iter().filter(|r| !r.ok) {
            tracing::warn!(
                "Category weights for owner {:?} total {}%",
                report.owner_id,
                report.total_weight
            );
        }

        Ok(reports)
    }

    async fn rescore_for(&self, category: &Category) -> Result<usize> {
        let scope = if category.is_default {
            RescoreScope::All
        } else {
            RescoreScope::Owner(category.owner_id.clone())
        };
        rescore_tasks(&self.repo, scope, Utc::now()).await
    }
}
