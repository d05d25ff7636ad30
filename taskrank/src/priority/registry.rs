//! Category registry rules
//!
//! `CategoryRegistry` is an in-memory snapshot of every stored category.
//! Each `check_*` method decides whether a write is allowed and returns
//! what should be persisted; nothing here touches storage.
//!
//! An owner scope is the global defaults plus that owner's categories.
//! Defaults belong to every scope, so a write to a default is checked
//! against the heaviest scope.

use super::defaults::default_categories;
use super::validation::{
    validate_category_id, validate_color, validate_display_name, validate_optional_text,
    validate_weight,
};
use super::weights::{check_prospective, total_weight, validate_total};
use crate::config::{MAX_CATEGORY_NAME_LENGTH, MAX_TOTAL_WEIGHT};
use crate::database::{Category, CategoryPatch, NewCategory};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Weight health of one owner scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeWeightReport {
    /// `None` for the defaults-only scope
    pub owner_id: Option<String>,
    pub total_weight: u32,
    pub ok: bool,
}

/// Outcome of a validated bulk weight change
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWeightPlan {
    /// Categories with their new weights, ready to persist
    pub updates: Vec<Category>,
    /// Requested ids that don't exist in the scope
    pub skipped: Vec<String>,
    /// Scope total after the change
    pub total_weight: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Global defaults ordered by id
    pub fn defaults(&self) -> Vec<&Category> {
        let mut defaults: Vec<&Category> = self.categories.iter().filter(|c| c.is_default).collect();
        defaults.sort_by(|a, b| a.id.cmp(&b.id));
        defaults
    }

    /// Defaults first, then the owner's categories, each ordered by id
    pub fn scope(&self, owner: Option<&str>) -> Vec<&Category> {
        let mut scope: Vec<&Category> = self
            .categories
            .iter()
            .filter(|c| c.in_scope_of(owner))
            .collect();
        scope.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.id.cmp(&b.id)));
        scope
    }

    /// Owned copy of a scope, as the scoring engine takes it
    pub fn scope_categories(&self, owner: Option<&str>) -> Vec<Category> {
        self.scope(owner).into_iter().cloned().collect()
    }

    pub fn find(&self, owner: Option<&str>, id: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.id == id && c.in_scope_of(owner))
    }

    fn owners(&self) -> BTreeSet<&str> {
        self.categories
            .iter()
            .filter(|c| !c.is_default)
            .filter_map(|c| c.owner_id.as_deref())
            .collect()
    }

    fn owned_total(&self, owner: &str, excluding: Option<&str>) -> u32 {
        total_weight(self.categories.iter().filter(|c| {
            !c.is_default && c.owner_id.as_deref() == Some(owner) && Some(c.id.as_str()) != excluding
        }))
    }

    fn defaults_total(&self, excluding: Option<&str>) -> u32 {
        total_weight(
            self.categories
                .iter()
                .filter(|c| c.is_default && Some(c.id.as_str()) != excluding),
        )
    }

    /// Total of the scope a write is checked against, leaving out the
    /// category `excluding` (the one being replaced).
    ///
    /// For an owner it is their scope. For the global namespace it is the
    /// heaviest scope: defaults plus the largest custom total of any owner.
    fn binding_total(&self, owner: Option<&str>, excluding: Option<&str>) -> u32 {
        match owner {
            Some(owner) => self
                .defaults_total(None)
                .saturating_add(self.owned_total(owner, excluding)),
            None => {
                let heaviest_owner = self
                    .owners()
                    .into_iter()
                    .map(|o| self.owned_total(o, None))
                    .max()
                    .unwrap_or(0);
                self.defaults_total(excluding).saturating_add(heaviest_owner)
            }
        }
    }

    /// Validate a new category and return it ready to insert.
    ///
    /// A default is always global; a custom category needs an owner.
    pub fn check_create(
        &self,
        owner: Option<&str>,
        req: &NewCategory,
        now: DateTime<Utc>,
    ) -> Result<Category> {
        validate_category_id(&req.id)?;
        let display_name = validate_display_name(&req.display_name)?;
        let secondary_name = validate_optional_text(
            "Secondary name",
            req.secondary_name.clone(),
            MAX_CATEGORY_NAME_LENGTH,
        )?;
        validate_weight(req.weight)?;
        validate_color(&req.color)?;

        let owner = if req.is_default { None } else { owner };
        if !req.is_default && owner.is_none() {
            return Err(AppError::Validation(
                "Custom categories need an owner".to_string(),
            ));
        }

        let duplicate = match owner {
            Some(owner) => self.find(Some(owner), &req.id).is_some(),
            // A new default joins every scope, so it may not shadow anyone
            None => self.categories.iter().any(|c| c.id == req.id),
        };
        if duplicate {
            return Err(AppError::DuplicateId(req.id.clone()));
        }

        check_prospective(self.binding_total(owner, None), req.weight)?;

        let mut builder = Category::builder(req.id.clone(), display_name, req.weight)
            .color(req.color.clone())
            .at(now);
        if let Some(name) = secondary_name {
            builder = builder.secondary_name(name);
        }
        builder = match owner {
            Some(owner) => builder.owner(owner),
            None => builder.default_category(),
        };
        Ok(builder.build())
    }

    /// Validate a patch and return the updated category
    pub fn check_update(
        &self,
        owner: Option<&str>,
        id: &str,
        patch: &CategoryPatch,
        now: DateTime<Utc>,
    ) -> Result<Category> {
        let existing = self
            .find(owner, id)
            .ok_or_else(|| AppError::CategoryNotFound(id.to_string()))?;

        match patch.is_default {
            Some(false) if existing.is_default => {
                return Err(AppError::CannotModifyDefault(id.to_string()));
            }
            Some(true) if !existing.is_default => {
                return Err(AppError::Validation(format!(
                    "Custom category {} cannot be promoted to a default",
                    id
                )));
            }
            _ => {}
        }

        let mut updated = existing.clone();

        if let Some(name) = &patch.display_name {
            updated.display_name = validate_display_name(name)?;
        }
        if let Some(name) = &patch.secondary_name {
            updated.secondary_name = validate_optional_text(
                "Secondary name",
                Some(name.clone()),
                MAX_CATEGORY_NAME_LENGTH,
            )?;
        }
        if let Some(color) = &patch.color {
            validate_color(color)?;
            updated.color = color.clone();
        }
        if let Some(weight) = patch.weight {
            validate_weight(weight)?;
            if weight != existing.weight {
                let scope_owner = if existing.is_default {
                    None
                } else {
                    existing.owner_id.as_deref()
                };
                check_prospective(self.binding_total(scope_owner, Some(id)), weight)?;
            }
            updated.weight = weight;
        }

        updated.updated_at = now;
        Ok(updated)
    }

    /// Find a category that may be deleted, pending the usage check
    pub fn check_delete(&self, owner: Option<&str>, id: &str) -> Result<&Category> {
        let existing = self
            .find(owner, id)
            .ok_or_else(|| AppError::CategoryNotFound(id.to_string()))?;

        if existing.is_default {
            return Err(AppError::CannotDeleteDefault(id.to_string()));
        }

        Ok(existing)
    }

    /// Validate a set of new weights for categories in `owner`'s scope.
    ///
    /// Unknown ids are skipped and reported. Nothing is planned unless the
    /// provided weights and every affected scope stay within the limit.
    pub fn check_bulk_weights(
        &self,
        owner: Option<&str>,
        weights: &BTreeMap<String, u32>,
        now: DateTime<Utc>,
    ) -> Result<BulkWeightPlan> {
        for weight in weights.values() {
            validate_weight(*weight)?;
        }

        let provided = weights.values().fold(0u32, |acc, w| acc.saturating_add(*w));
        check_prospective(0, provided)?;

        let mut updates = Vec::new();
        let mut skipped = Vec::new();
        for (id, weight) in weights {
            match self.find(owner, id) {
                Some(existing) => {
                    let mut updated = existing.clone();
                    updated.weight = *weight;
                    updated.updated_at = now;
                    updates.push(updated);
                }
                None => skipped.push(id.clone()),
            }
        }

        let mut proposed = self.clone();
        for update in &updates {
            if let Some(slot) = proposed
                .categories
                .iter_mut()
                .find(|c| c.id == update.id && c.owner_id == update.owner_id)
            {
                *slot = update.clone();
            }
        }

        // Only scopes containing a changed category can newly exceed the limit
        let touches_defaults = updates.iter().any(|c| c.is_default);
        let mut affected: Vec<Option<&str>> = if touches_defaults {
            let mut all: Vec<Option<&str>> = proposed.owners().into_iter().map(Some).collect();
            all.push(None);
            all
        } else {
            vec![owner]
        };
        affected.dedup();

        // Reported like a single write: the untouched rest of the scope plus
        // the new weights that land in it
        for scope_owner in &affected {
            let after = validate_total(proposed.scope(*scope_owner)).total_weight;
            if after > MAX_TOTAL_WEIGHT {
                let unchanged = total_weight(
                    self.scope(*scope_owner)
                        .into_iter()
                        .filter(|c| !updates.iter().any(|u| u.id == c.id && u.owner_id == c.owner_id)),
                );
                return Err(AppError::WeightExceeded {
                    current: unchanged,
                    attempted: after.saturating_sub(unchanged),
                    would_be: after,
                });
            }
        }

        Ok(BulkWeightPlan {
            updates,
            skipped,
            total_weight: validate_total(proposed.scope(owner)).total_weight,
        })
    }

    /// The canonical defaults to insert, or nothing if any default exists.
    pub fn check_seed_defaults(&self, now: DateTime<Utc>) -> Result<Vec<Category>> {
        if self.categories.iter().any(|c| c.is_default) {
            return Ok(Vec::new());
        }

        let seed = default_categories(now);
        check_prospective(self.binding_total(None, None), total_weight(&seed))?;

        // A custom category may already use a canonical id
        if let Some(clash) = seed
            .iter()
            .find(|d| self.categories.iter().any(|c| c.id == d.id))
        {
            return Err(AppError::DuplicateId(clash.id.clone()));
        }

        Ok(seed)
    }

    /// Seed plan for a reset: what remains after dropping every default
    pub fn without_defaults(&self) -> CategoryRegistry {
        CategoryRegistry::new(
            self.categories
                .iter()
                .filter(|c| !c.is_default)
                .cloned()
                .collect(),
        )
    }

    /// Weight report for the defaults-only scope and every owner in
    /// `owners` or with custom categories
    pub fn weight_reports<'a, I>(&'a self, owners: I) -> Vec<ScopeWeightReport>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut all: BTreeSet<&str> = self.owners();
        all.extend(owners);

        std::iter::once(None)
            .chain(all.into_iter().map(Some))
            .map(|owner| {
                let check = validate_total(self.scope(owner));
                ScopeWeightReport {
                    owner_id: owner.map(str::to_string),
                    total_weight: check.total_weight,
                    ok: check.ok,
                }
            })
            .collect()
    }

    /// Full consistency check for a snapshot loaded from outside (restore).
    pub fn ensure_consistent(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for c in &self.categories {
            validate_category_id(&c.id)?;
            validate_weight(c.weight)?;
            if c.is_default && c.owner_id.is_some() {
                return Err(AppError::Validation(format!(
                    "Default category {} cannot have an owner",
                    c.id
                )));
            }
            if !c.is_default && c.owner_id.is_none() {
                return Err(AppError::Validation(format!(
                    "Custom category {} has no owner",
                    c.id
                )));
            }
            if !seen.insert((c.owner_id.clone(), c.id.clone())) {
                return Err(AppError::DuplicateId(c.id.clone()));
            }
        }

        for owner in self.owners() {
            if let Some(clash) = self.categories.iter().find(|c| {
                !c.is_default
                    && c.owner_id.as_deref() == Some(owner)
                    && self.categories.iter().any(|d| d.is_default && d.id == c.id)
            }) {
                return Err(AppError::DuplicateId(clash.id.clone()));
            }
        }

        if let Some(report) = self.weight_reports(std::iter::empty()).into_iter().find(|r| !r.ok) {
            return Err(AppError::WeightExceeded {
                current: 0,
                attempted: report.total_weight,
                would_be: report.total_weight,
            });
        }

        Ok(())
    }
}

/// A category referenced by task ratings cannot be removed
pub fn ensure_unused(category: &Category, usage_count: u32) -> Result<()> {
    if usage_count > 0 {
        return Err(AppError::InUse {
            id: category.id.clone(),
            count: usage_count,
        });
    }
    Ok(())
}
