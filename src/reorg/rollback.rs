use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::artifact::{self, FileFailure};
use super::backup::{hash_content, Manifest};
use super::progress::{NoProgress, ProgressSink};
use super::suggestions::LossCandidate;
use crate::error::{Result, VaultError};
use crate::logger::Logger;
use crate::vault::{fsutil, join_contained, normalize_rel, Vault};

pub const SAFETY_SUFFIX: &str = ".before_restore";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub dry_run: bool,
    pub backup_root: PathBuf,
    pub destination_root: PathBuf,
    pub restored_files: usize,
    pub failed_files: usize,
    pub restored: Vec<String>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRestoreStatus {
    Restored,
    WouldRestore,
    NoBackup,
    Missing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRestoreResult {
    pub file: String,
    pub status: FileRestoreStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_copy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRestoreReport {
    pub dry_run: bool,
    pub total: usize,
    pub restored: usize,
    pub would_restore: usize,
    pub no_backup: usize,
    pub missing: usize,
    pub errors: usize,
    pub results: Vec<FileRestoreResult>,
}

pub struct RollbackManager {
    backup_suffix: String,
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self {
            backup_suffix: ".backup".to_string(),
            progress: Arc::new(NoProgress),
            logger: Logger::new("RollbackManager"),
        }
    }

    pub fn with_backup_suffix(mut self, suffix: &str) -> Self {
        self.backup_suffix = suffix.to_string();
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Load the manifest in `backup_path` and restore its files over `destination`.
    pub async fn rollback(
        &self,
        backup_path: &Path,
        destination: &Path,
        dry_run: bool,
    ) -> Result<RestoreResult> {
        let manifest = Manifest::load(backup_path).await?;
        self.restore_from_backup(&manifest, destination, dry_run)
            .await
    }

    /// Copy every manifest file from the snapshot back to `destination`. Relocated
    /// documents are restored at their original paths; their moved copies stay.
    pub async fn restore_from_backup(
        &self,
        manifest: &Manifest,
        destination: &Path,
        dry_run: bool,
    ) -> Result<RestoreResult> {
        if !destination.is_dir() {
            return Err(VaultError::InvalidRoot(destination.to_path_buf()));
        }

        self.logger.info(&format!(
            "Restoring {} files from {} to {}{}",
            manifest.files.len(),
            manifest.backup_root.display(),
            destination.display(),
            if dry_run { " (dry run)" } else { "" }
        ));

        let total = manifest.files.len();
        let mut result = RestoreResult {
            dry_run,
            backup_root: manifest.backup_root.clone(),
            destination_root: destination.to_path_buf(),
            ..Default::default()
        };

        for (i, rel) in manifest.files.iter().enumerate() {
            match self
                .restore_one(manifest, rel, destination, dry_run)
                .await
            {
                Ok(()) => result.restored.push(rel.clone()),
                Err(reason) => result.failures.push(FileFailure::new(rel.clone(), reason)),
            }
            self.progress.advance("rollback", i + 1, total);
        }

        result.restored_files = result.restored.len();
        result.failed_files = result.failures.len();

        self.logger.info(&format!(
            "{}: {}, failed: {}",
            if dry_run { "Would restore" } else { "Restored" },
            result.restored_files,
            result.failed_files
        ));
        artifact::log_failures(
            &self.logger,
            result
                .failures
                .iter()
                .map(|f| (f.path.as_str(), f.error.as_str())),
        );

        Ok(result)
    }

    async fn restore_one(
        &self,
        manifest: &Manifest,
        rel: &str,
        destination: &Path,
        dry_run: bool,
    ) -> std::result::Result<(), String> {
        let (source, target) = match (
            join_contained(&manifest.backup_root, rel),
            join_contained(destination, rel),
        ) {
            (Some(source), Some(target)) => (source, target),
            _ => return Err("Path leaves the destination root".to_string()),
        };
        if !source.is_file() {
            return Err("Backup file does not exist".to_string());
        }

        let bytes = tokio::fs::read(&source)
            .await
            .map_err(|e| VaultError::io(&source, e).to_string())?;
        if let Some(expected) = manifest.checksums.get(rel) {
            if *expected != hash_content(&bytes) {
                return Err("Backup file checksum mismatch".to_string());
            }
        }

        if dry_run {
            return Ok(());
        }

        fsutil::ensure_parent(&target)
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| VaultError::io(&target, e).to_string())
    }

    /// Put `<file>.backup` back over a document, keeping the current version as
    /// `<file>.before_restore`.
    pub async fn restore_file(&self, vault: &Vault, rel: &str, dry_run: bool) -> FileRestoreResult {
        let rel = normalize_rel(rel);
        let mut result = FileRestoreResult {
            file: rel,
            status: FileRestoreStatus::Error,
            safety_copy: None,
            error: None,
        };
        let path = match vault.resolve(&result.file) {
            Ok(path) => path,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };
        let backup = fsutil::with_suffix(&path, &self.backup_suffix);

        if !backup.is_file() {
            result.status = FileRestoreStatus::NoBackup;
            return result;
        }
        if !path.is_file() {
            result.status = FileRestoreStatus::Missing;
            return result;
        }
        if dry_run {
            result.status = FileRestoreStatus::WouldRestore;
            return result;
        }

        let safety = fsutil::with_suffix(&path, SAFETY_SUFFIX);
        let restored = match fsutil::copy_file(&path, &safety).await {
            Ok(()) => fsutil::copy_file(&backup, &path).await,
            Err(e) => Err(e),
        };

        match restored {
            Ok(()) => {
                result.status = FileRestoreStatus::Restored;
                result.safety_copy = Some(format!("{}{}", result.file, SAFETY_SUFFIX));
            }
            Err(e) => result.error = Some(e.to_string()),
        }
        result
    }

    pub async fn restore_candidates(
        &self,
        vault: &Vault,
        candidates: &[LossCandidate],
        dry_run: bool,
    ) -> FileRestoreReport {
        let total = candidates.len();
        let mut report = FileRestoreReport {
            dry_run,
            total,
            ..Default::default()
        };

        for (i, candidate) in candidates.iter().enumerate() {
            let result = self.restore_file(vault, &candidate.file, dry_run).await;
            match result.status {
                FileRestoreStatus::Restored => report.restored += 1,
                FileRestoreStatus::WouldRestore => report.would_restore += 1,
                FileRestoreStatus::NoBackup => report.no_backup += 1,
                FileRestoreStatus::Missing => report.missing += 1,
                FileRestoreStatus::Error => report.errors += 1,
            }
            report.results.push(result);
            self.progress.advance("restore", i + 1, total);
        }

        self.logger.info(&format!(
            "Restore: {} restored, {} would restore, {} without backup, {} missing, {} errors",
            report.restored, report.would_restore, report.no_backup, report.missing, report.errors
        ));
        if report.restored > 0 {
            self.logger.info(&format!(
                "Current versions saved with the {} suffix",
                SAFETY_SUFFIX
            ));
        }
        artifact::log_failures(
            &self.logger,
            report
                .results
                .iter()
                .filter_map(|r| r.error.as_deref().map(|e| (r.file.as_str(), e))),
        );

        report
    }
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}
