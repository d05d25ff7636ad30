//! Settings service
//!
//! Manages user settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_BACKUP_RETENTION_COUNT, DEFAULT_LIST_LIMIT, MAX_BACKUP_RETENTION_COUNT,
    MIN_BACKUP_RETENTION_COUNT,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Task listing preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListSettings {
    /// Leave completed tasks out of listings unless asked for
    #[serde(default)]
    pub hide_completed: bool,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for TaskListSettings {
    fn default() -> Self {
        Self {
            hide_completed: false,
            list_limit: default_list_limit(),
        }
    }
}

/// Backup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Number of backup files to keep
    #[serde(default = "default_backup_retention")]
    pub retention_count: usize,
    /// Custom backup location (if None, uses default data_dir/backups)
    #[serde(default)]
    pub location: Option<String>,
}

fn default_backup_retention() -> usize {
    DEFAULT_BACKUP_RETENTION_COUNT
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention_count: default_backup_retention(),
            location: None,
        }
    }
}

/// User settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppSettings {
    /// Owner used when the command line doesn't name one
    #[serde(default)]
    pub default_owner: Option<String>,
    #[serde(default)]
    pub tasks: TaskListSettings,
    #[serde(default)]
    pub backup: BackupSettings,
}

impl AppSettings {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BACKUP_RETENTION_COUNT..=MAX_BACKUP_RETENTION_COUNT)
            .contains(&self.backup.retention_count)
        {
            return Err(AppError::Validation(format!(
                "Backup retention must be between {} and {}",
                MIN_BACKUP_RETENTION_COUNT, MAX_BACKUP_RETENTION_COUNT
            )));
        }
        if self.tasks.list_limit == 0 {
            return Err(AppError::Validation(
                "Task list limit must be at least 1".to_string(),
            ));
        }
        if matches!(&self.default_owner, Some(owner) if owner.trim().is_empty()) {
            return Err(AppError::Validation(
                "Default owner cannot be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Service for managing user settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join("settings.json"),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        settings.validate()?;

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Generic(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    pub async fn get_task_list(&self) -> Result<TaskListSettings> {
        let settings = self.load().await?;
        Ok(settings.tasks)
    }

    pub async fn update_task_list(&self, tasks: TaskListSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.tasks = tasks;
        self.save(&settings).await?;
        Ok(())
    }

    /// Get backup settings
    pub async fn get_backup(&self) -> Result<BackupSettings> {
        let settings = self.load().await?;
        Ok(settings.backup)
    }

    /// Update backup settings
    pub async fn update_backup(&self, backup: BackupSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.backup = backup;
        self.save(&settings).await?;
        Ok(())
    }

    /// Set or clear the default owner
    pub async fn set_default_owner(&self, owner: Option<String>) -> Result<()> {
        let mut settings = self.load().await?;
        settings.default_owner = owner;
        self.save(&settings).await?;
        Ok(())
    }
}
