//! Backup service
//!
//! Snapshots every category and task into a ZIP file with a manifest of
//! SHA-256 checksums. Restoring verifies the checksums and the category
//! weight rules before anything is replaced.

use super::categories::CategoryService;
use super::tasks::{rescore_tasks, RescoreScope};
use crate::config::{DEFAULT_BACKUP_RETENTION_COUNT, EXPORT_FORMAT_VERSION};
use crate::database::{Backup, Category, Repository, Task};
use crate::error::{AppError, Result};
use crate::priority::validation::validate_title;
use crate::priority::CategoryRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

const DATA_FILE: &str = "data.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Backup manifest structure
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: String,
    pub timestamp: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

/// Full store contents as written to `data.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub taken_at: DateTime<Utc>,
    pub categories: Vec<Category>,
    pub tasks: Vec<Task>,
}

/// What a restore put back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub categories: usize,
    pub tasks: usize,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    repo: Repository,
    categories: CategoryService,
    backups_dir: PathBuf,
    retention_count: usize,
}

impl BackupService {
    pub fn new(repo: Repository, categories: CategoryService, backups_dir: PathBuf) -> Self {
        Self {
            repo,
            categories,
            backups_dir,
            retention_count: DEFAULT_BACKUP_RETENTION_COUNT,
        }
    }

    /// Keep at most `count` backup files
    pub fn with_retention(mut self, count: usize) -> Self {
        self.retention_count = count.max(1);
        self
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Create a backup of every category and task
    pub async fn create_backup(&self) -> Result<PathBuf> {
        tracing::info!("Creating backup");

        if self.backups_dir.exists() && !self.backups_dir.is_dir() {
            return Err(AppError::Backup(format!(
                "Backup location is not a directory: {:?}",
                self.backups_dir
            )));
        }
        fs::create_dir_all(&self.backups_dir).await?;

        let now = Utc::now();
        let snapshot = StoreSnapshot {
            format_version: EXPORT_FORMAT_VERSION,
            taken_at: now,
            categories: self.repo.list_categories().await?,
            tasks: self.repo.list_all_tasks().await?,
        };
        let data = serde_json::to_vec_pretty(&snapshot)?;

        let (archive, manifest_checksum) = build_archive(&data, now)?;

        let backup_filename = format!("backup_{}.zip", now.format("%Y%m%d_%H%M%S_%3f"));
        let backup_path = self.backups_dir.join(&backup_filename);
        let temp_path = self.backups_dir.join(format!("{}.tmp", backup_filename));

        // Write then rename so a partial file never looks like a backup
        fs::write(&temp_path, &archive).await?;
        fs::rename(&temp_path, &backup_path).await?;

        let size = archive.len() as i64;
        self.repo
            .record_backup(
                backup_path.to_string_lossy().as_ref(),
                size,
                &manifest_checksum,
            )
            .await?;

        tracing::info!(
            "Backup created: {:?} ({} bytes, {} categories, {} tasks)",
            backup_path,
            size,
            snapshot.categories.len(),
            snapshot.tasks.len()
        );

        self.apply_retention_policy().await?;

        Ok(backup_path)
    }

    /// Apply retention policy (keep only the newest N backup files)
    async fn apply_retention_policy(&self) -> Result<()> {
        let backups = self.repo.list_backups().await?;

        if backups.len() <= self.retention_count {
            return Ok(());
        }

        for backup in backups.iter().skip(self.retention_count) {
            if !Path::new(&backup.path).exists() {
                continue;
            }

            tracing::info!("Deleting old backup: {}", backup.path);

            if let Err(e) = fs::remove_file(&backup.path).await {
                tracing::warn!("Failed to delete backup file {}: {}", backup.path, e);
            }

            // Note: We keep the database record for history
        }

        Ok(())
    }

    /// List recorded backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<Backup>> {
        self.repo.list_backups().await
    }

    /// Replace all categories and tasks with the contents of a backup
    pub async fn restore_backup(&self, backup_path: &Path) -> Result<RestoreSummary> {
        tracing::info!("Restoring from backup: {:?}", backup_path);

        let bytes = fs::read(backup_path).await?;
        let (manifest, data) = read_verified_archive(bytes)?;

        tracing::info!(
            "Backup version: {}, timestamp: {}, files: {}",
            manifest.version,
            manifest.timestamp,
            manifest.files.len()
        );

        let snapshot: StoreSnapshot = serde_json::from_slice(&data)
            .map_err(|e| AppError::Restore(format!("Invalid snapshot data: {}", e)))?;
        if snapshot.format_version > EXPORT_FORMAT_VERSION {
            return Err(AppError::Restore(format!(
                "Unsupported snapshot format version {}",
                snapshot.format_version
            )));
        }

        check_snapshot(&snapshot)?;

        let _guard = self.categories.lock_writes().await;

        self.repo
            .replace_all(&snapshot.categories, &snapshot.tasks)
            .await?;
        let rescored = rescore_tasks(&self.repo, RescoreScope::All, Utc::now()).await?;

        tracing::info!(
            "Restore completed successfully ({} scores changed since the backup)",
            rescored
        );

        Ok(RestoreSummary {
            categories: snapshot.categories.len(),
            tasks: snapshot.tasks.len(),
        })
    }
}

/// The snapshot must satisfy the same rules as live data
fn check_snapshot(snapshot: &StoreSnapshot) -> Result<()> {
    CategoryRegistry::new(snapshot.categories.clone()).ensure_consistent()?;

    for task in &snapshot.tasks {
        validate_title(&task.title)?;
    }

    Ok(())
}

/// Build a backup ZIP holding `data` and its manifest. Returns the archive
/// bytes and the checksum of the manifest.
fn build_archive(data: &[u8], taken_at: DateTime<Utc>) -> Result<(Vec<u8>, String)> {
    let manifest = BackupManifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: taken_at.to_rfc3339(),
        files: vec![FileEntry {
            path: DATA_FILE.to_string(),
            size: data.len() as u64,
            checksum: calculate_checksum(data),
        }],
    };
    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    let manifest_checksum = calculate_checksum(manifest_json.as_bytes());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(DATA_FILE, options)?;
    zip.write_all(data)?;

    zip.start_file(MANIFEST_FILE, options)?;
    zip.write_all(manifest_json.as_bytes())?;

    let cursor = zip.finish()?;
    Ok((cursor.into_inner(), manifest_checksum))
}

/// Open a backup archive and check every file against the manifest.
/// Returns the manifest and the verified snapshot bytes.
fn read_verified_archive(bytes: Vec<u8>) -> Result<(BackupManifest, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Restore(format!("Invalid backup file: {}", e)))?;

    let manifest: BackupManifest = {
        let mut manifest_file = archive
            .by_name(MANIFEST_FILE)
            .map_err(|_| AppError::Restore("Backup has no manifest".to_string()))?;
        let mut manifest_data = String::new();
        manifest_file.read_to_string(&mut manifest_data)?;
        serde_json::from_str(&manifest_data)
            .map_err(|e| AppError::Restore(format!("Invalid manifest: {}", e)))?
    };

    let mut data = None;
    for file_entry in &manifest.files {
        let contents = {
            let mut file = archive.by_name(&file_entry.path).map_err(|_| {
                AppError::Restore(format!("Backup is missing {}", file_entry.path))
            })?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            contents
        };

        let actual_checksum = calculate_checksum(&contents);
        if actual_checksum != file_entry.checksum {
            return Err(AppError::Restore(format!(
                "Checksum mismatch for {}: expected {}, got {}",
                file_entry.path, file_entry.checksum, actual_checksum
            )));
        }

        tracing::debug!("Verified: {}", file_entry.path);

        if file_entry.path == DATA_FILE {
            data = Some(contents);
        }
    }

    let data = data.ok_or_else(|| {
        AppError::Restore(format!("Manifest does not list {}", DATA_FILE))
    })?;

    Ok((manifest, data))
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, NewTask, TaskQuery};
    use crate::priority::PriorityRatings;
    use crate::services::TaskService;
    use tempfile::TempDir;

    struct Fixture {
        service: BackupService,
        categories: CategoryService,
        tasks: TaskService,
        _temp: TempDir,
    }

    async fn create_test_service() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_memory_pool().await.unwrap();
        let repo = Repository::new(pool);

        let categories = CategoryService::new(repo.clone());
        categories.initialize_defaults().await.unwrap();
        let tasks = TaskService::new(repo.clone(), categories.clone());

        let service = BackupService::new(
            repo,
            categories.clone(),
            temp_dir.path().join("backups"),
        );

        Fixture {
            service,
            categories,
            tasks,
            _temp: temp_dir,
        }
    }

    fn read_manifest(path: &Path) -> BackupManifest {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let mut manifest_file = archive.by_name(MANIFEST_FILE).unwrap();
        let mut manifest_data = String::new();
        manifest_file.read_to_string(&mut manifest_data).unwrap();
        serde_json::from_str(&manifest_data).unwrap()
    }

    #[tokio::test]
    async fn test_create_backup() {
        let f = create_test_service().await;

        let backup_path = f.service.create_backup().await.unwrap();

        assert!(backup_path.exists());
        let name = backup_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("backup_"));
        assert!(name.ends_with(".zip"));

        let backups = f.service.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].path, backup_path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_backup_contains_manifest() {
        let f = create_test_service().await;

        let backup_path = f.service.create_backup().await.unwrap();
        let manifest = read_manifest(&backup_path);

        assert_eq!(manifest.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, DATA_FILE);
        assert_eq!(manifest.files[0].checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_retention_policy() {
        let f = create_test_service().await;
        let service = f.service.clone().with_retention(3);

        for _ in 0..5 {
            service.create_backup().await.unwrap();
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }

        let backups = service.list_backups().await.unwrap();

        // Records are kept for history
        assert_eq!(backups.len(), 5);

        let existing: Vec<bool> = backups
            .iter()
            .map(|b| Path::new(&b.path).exists())
            .collect();
        assert_eq!(existing, vec![true, true, true, false, false]);
    }

    #[tokio::test]
    async fn test_restore_backup() {
        let f = create_test_service().await;

        let original = f
            .tasks
            .create_task(
                None,
                NewTask {
                    priority_ratings: PriorityRatings::from_pairs([("impact", 4)]).unwrap(),
                    ..NewTask::titled("Original")
                },
            )
            .await
            .unwrap();

        let backup_path = f.service.create_backup().await.unwrap();

        // Change things after the backup
        f.tasks.delete_task(&original.id).await.unwrap();
        f.tasks
            .create_task(None, NewTask::titled("Added later"))
            .await
            .unwrap();
        f.categories
            .bulk_set_weights(None, [("impact".to_string(), 5)].into())
            .await
            .unwrap();

        let summary = f.service.restore_backup(&backup_path).await.unwrap();
        assert_eq!(summary, RestoreSummary { categories: 7, tasks: 1 });

        let restored = f
            .tasks
            .list_tasks(&TaskQuery::for_owner(None))
            .await
            .unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, original.id);
        assert_eq!(restored[0].priority_score, 100.0);

        let impact = f
            .categories
            .list_defaults()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "impact")
            .unwrap();
        assert_eq!(impact.weight, 25);
    }

    #[tokio::test]
    async fn test_restore_corrupted_backup() {
        let f = create_test_service().await;
        let backup_path = f.service.create_backup().await.unwrap();

        // Rebuild the archive with altered data but the original manifest
        let manifest = read_manifest(&backup_path);
        let mut zip = ZipWriter::new(std::fs::File::create(&backup_path).unwrap());
        let options = FileOptions::<()>::default();
        zip.start_file(DATA_FILE, options).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.start_file(MANIFEST_FILE, options).unwrap();
        zip.write_all(serde_json::to_string(&manifest).unwrap().as_bytes())
            .unwrap();
        zip.finish().unwrap();

        let result = f.service.restore_backup(&backup_path).await;
        assert!(matches!(result, Err(AppError::Restore(_))));

        // Live data untouched
        assert_eq!(f.categories.list_defaults().await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_restore_rejects_overweight_snapshot() {
        let f = create_test_service().await;
        f.tasks
            .create_task(None, NewTask::titled("Keep me"))
            .await
            .unwrap();

        let now = Utc::now();
        let snapshot = StoreSnapshot {
            format_version: EXPORT_FORMAT_VERSION,
            taken_at: now,
            categories: vec![
                Category::builder("a", "A", 60).default_category().at(now).build(),
                Category::builder("b", "B", 50).default_category().at(now).build(),
            ],
            tasks: Vec::new(),
        };
        let (archive, _) = build_archive(&serde_json::to_vec(&snapshot).unwrap(), now).unwrap();
        let path = f.service.backups_dir().join("crafted.zip");
        fs::create_dir_all(f.service.backups_dir()).await.unwrap();
        fs::write(&path, archive).await.unwrap();

        let result = f.service.restore_backup(&path).await;
        assert!(matches!(result, Err(AppError::WeightExceeded { would_be: 110, .. })));

        let tasks = f
            .tasks
            .list_tasks(&TaskQuery::for_owner(None))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_missing_file() {
        let f = create_test_service().await;
        let result = f
            .service
            .restore_backup(&f.service.backups_dir().join("nope.zip"))
            .await;
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
