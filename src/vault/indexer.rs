use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::logger::Logger;

/// File that marks a directory as a vault snapshot; snapshots are never indexed.
pub const SNAPSHOT_MARKER: &str = "backup_manifest.json";

/// Enumerates the indexable documents of a vault.
#[derive(Debug, Clone)]
pub struct VaultIndexer {
    extension: String,
    ignore_patterns: HashSet<String>,
    excluded_roots: Vec<PathBuf>,
    logger: Logger,
}

impl VaultIndexer {
    pub fn new(extension: &str) -> Self {
        let mut ignore_patterns = HashSet::new();
        ignore_patterns.insert(".git".to_string());
        ignore_patterns.insert(".obsidian".to_string());
        ignore_patterns.insert(".trash".to_string());
        ignore_patterns.insert("node_modules".to_string());

        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            ignore_patterns,
            excluded_roots: Vec::new(),
            logger: Logger::new("VaultIndexer"),
        }
    }

    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_ignore_pattern(&mut self, pattern: String) {
        self.ignore_patterns.insert(pattern);
    }

    /// Skip everything below `root`, e.g. a backup directory that lives inside the vault.
    pub fn exclude_root(&mut self, root: PathBuf) {
        self.excluded_roots.push(root);
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Every matching document below `vault_path`, sorted by path.
    pub fn scan_vault_files(&self, vault_path: &Path) -> Vec<PathBuf> {
        let files = self.walk(vault_path, |path| self.is_indexable(path));
        self.logger.debug(&format!(
            "Found {} .{} files under {}",
            files.len(),
            self.extension,
            vault_path.display()
        ));
        files
    }

    /// Single-file backups of documents, e.g. `note.md.backup` for suffix `.backup`.
    pub fn scan_backup_files(&self, vault_path: &Path, suffix: &str) -> Vec<PathBuf> {
        let ending = format!(".{}{}", self.extension, suffix).to_lowercase();
        self.walk(vault_path, |path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.to_lowercase().ends_with(&ending))
                .unwrap_or(false)
        })
    }

    fn walk<F>(&self, vault_path: &Path, matches: F) -> Vec<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let mut files = Vec::new();

        for entry in WalkDir::new(vault_path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(self.should_ignore(e.path())
                        || (e.file_type().is_dir() && is_snapshot(e.path())))
            })
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.logger.warn(&format!("Skipping unreadable entry: {}", e));
                    continue;
                }
            };

            if entry.file_type().is_file() && matches(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files
    }

    pub fn is_indexable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    fn should_ignore(&self, path: &Path) -> bool {
        if self.excluded_roots.iter().any(|root| path.starts_with(root)) {
            return true;
        }

        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| self.ignore_patterns.contains(name))
            .unwrap_or(false)
    }
}

fn is_snapshot(dir: &Path) -> bool {
    dir.join(SNAPSHOT_MARKER).is_file()
}
