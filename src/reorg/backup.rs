use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use super::artifact::{self, FileFailure};
use super::progress::{NoProgress, ProgressSink};
use crate::error::{Result, VaultError};
use crate::logger::Logger;
use crate::vault::indexer::SNAPSHOT_MARKER;
use crate::vault::{fsutil, nested_under, Vault};

pub const MANIFEST_FILE: &str = SNAPSHOT_MARKER;
const FOLDER_PREFIX: &str = "vault_backup_";

/// Record of one full-corpus snapshot. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub backup_timestamp: String,
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub total_files: usize,
    pub files: Vec<String>,
    pub failures: Vec<FileFailure>,
    /// Relative path -> blake3 hex of the copied bytes.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Manifest {
    pub async fn load(backup_path: &Path) -> Result<Self> {
        let path = backup_path.join(MANIFEST_FILE);
        let json = tokio::fs::read_to_string(&path).await.map_err(|e| {
            VaultError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| VaultError::Manifest(format!("invalid {}: {}", path.display(), e)))
    }

    pub fn copied_files(&self) -> usize {
        self.files.len()
    }
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

pub struct BackupManager {
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl BackupManager {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoProgress),
            logger: Logger::new("BackupManager"),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Copy every document of `vault` into a fresh timestamped folder under `backup_dir`.
    /// Per-file copy failures are recorded in the manifest; the snapshot continues.
    pub async fn create_backup(&self, vault: &Vault, backup_dir: &Path) -> Result<Manifest> {
        tokio::fs::create_dir_all(backup_dir)
            .await
            .map_err(|e| VaultError::io(backup_dir, e))?;

        // Enumerate before the backup folder exists so it can never list itself.
        let mut indexer = vault.indexer().clone();
        if let Some(inside) = nested_under(vault.root(), backup_dir) {
            indexer.exclude_root(inside);
        }
        let files: Vec<String> = indexer
            .scan_vault_files(vault.root())
            .iter()
            .filter_map(|p| vault.relative_path(p))
            .collect();

        let now = chrono::Local::now();
        let backup_root = unique_folder(backup_dir, &now.format("%Y%m%d_%H%M%S").to_string());
        tokio::fs::create_dir_all(&backup_root)
            .await
            .map_err(|e| VaultError::io(&backup_root, e))?;

        self.logger.info(&format!(
            "Backing up {} documents from {} to {}",
            files.len(),
            vault.root().display(),
            backup_root.display()
        ));

        let total = files.len();
        let mut copied = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut checksums = BTreeMap::new();

        for (i, rel) in files.into_iter().enumerate() {
            match copy_one(vault.abs_path(&rel), backup_root.join(&rel)).await {
                Ok(checksum) => {
                    checksums.insert(rel.clone(), checksum);
                    copied.push(rel);
                }
                Err(e) => failures.push(FileFailure::new(rel, e)),
            }
            self.progress.advance("backup", i + 1, total);
        }

        let manifest = Manifest {
            backup_timestamp: now.to_rfc3339(),
            source_root: vault.root().to_path_buf(),
            backup_root: backup_root.clone(),
            total_files: copied.len(),
            files: copied,
            failures,
            checksums,
        };
        artifact::write_json(&backup_root.join(MANIFEST_FILE), &manifest).await?;

        self.logger.info(&format!(
            "Backup complete: {} files copied, {} failed",
            manifest.total_files,
            manifest.failures.len()
        ));
        artifact::log_failures(
            &self.logger,
            manifest
                .failures
                .iter()
                .map(|f| (f.path.as_str(), f.error.as_str())),
        );

        Ok(manifest)
    }
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn copy_one(src: PathBuf, dst: PathBuf) -> Result<String> {
    let bytes = tokio::fs::read(&src)
        .await
        .map_err(|e| VaultError::io(&src, e))?;
    fsutil::ensure_parent(&dst).await?;
    tokio::fs::write(&dst, &bytes)
        .await
        .map_err(|e| VaultError::io(&dst, e))?;
    Ok(hash_content(&bytes))
}

/// `backup_dir` expressed under `root` when it lives inside the vault.
fn unique_folder(backup_dir: &Path, stamp: &str) -> PathBuf {
    let base = backup_dir.join(format!("{}{}", FOLDER_PREFIX, stamp));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|n| backup_dir.join(format!("{}{}_{}", FOLDER_PREFIX, stamp, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}
