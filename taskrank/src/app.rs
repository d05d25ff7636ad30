//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{
    AppSettings, BackupService, CategoryService, SettingsService, TaskService, TransferService,
};
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "taskrank.sqlite";

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: AppSettings,
    pub settings_service: SettingsService,
    pub categories: CategoryService,
    pub tasks: TaskService,
    pub transfer: TransferService,
    pub backup: BackupService,
}

impl AppState {
    /// Open (or create) the data directory, run migrations and make sure
    /// the default categories exist
    pub async fn initialize(data_dir: &Path) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", data_dir);

        std::fs::create_dir_all(data_dir)?;

        let settings_service = SettingsService::new(data_dir.to_path_buf());
        let settings = settings_service.load().await?;

        let pool = create_pool(&data_dir.join(DATABASE_FILE)).await?;
        let repo = Repository::new(pool);

        let categories = CategoryService::new(repo.clone());
        let tasks = TaskService::new(repo.clone(), categories.clone());
        let transfer = TransferService::new(repo.clone(), categories.clone(), tasks.clone());

        let backups_dir = settings
            .backup
            .location
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("backups"));
        std::fs::create_dir_all(&backups_dir)?;
        let backup = BackupService::new(repo, categories.clone(), backups_dir)
            .with_retention(settings.backup.retention_count);

        let seeded = categories.initialize_defaults().await?;
        if seeded > 0 {
            tracing::info!("First run: seeded {} default categories", seeded);
        }

        tracing::info!("Application initialized successfully");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            settings,
            settings_service,
            categories,
            tasks,
            transfer,
            backup,
        })
    }

    /// Owner to act as: the explicit one, else the configured default
    pub fn resolve_owner(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.settings.default_owner.clone())
    }
}
