pub mod fsutil;
pub mod indexer;
pub mod links;
pub mod parser;

use std::path::{Component, Path, PathBuf};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

pub use indexer::VaultIndexer;
pub use links::{LinkMapping, MoveRecord};
pub use parser::{Document, Metadata, Reference};

/// An explicit vault root plus the rules for enumerating its documents.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    indexer: VaultIndexer,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_indexer(root, VaultIndexer::new("md"))
    }

    /// Open the configured vault. Backup and report directories that live inside the
    /// root are left out of every document listing.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let indexer =
            VaultIndexer::new(&config.extension).with_ignore_patterns(config.ignore.iter().cloned());
        let mut vault = Self::with_indexer(&config.path, indexer)?;
        vault.exclude_dir(&config.backup_dir);
        vault.exclude_dir(&config.output_dir);
        Ok(vault)
    }

    pub fn with_indexer(root: impl Into<PathBuf>, indexer: VaultIndexer) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(VaultError::InvalidRoot(root));
        }
        Ok(Self { root, indexer })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn indexer(&self) -> &VaultIndexer {
        &self.indexer
    }

    pub fn extension(&self) -> &str {
        self.indexer.extension()
    }

    /// Leave `dir` out of document listings when it lies inside the root. Directories
    /// that do not exist yet or live elsewhere are ignored.
    pub fn exclude_dir(&mut self, dir: &Path) {
        if let Some(inside) = nested_under(&self.root, dir) {
            self.indexer.exclude_root(inside);
        }
    }

    /// Absolute path of a vault-relative, forward-slash path. `..` segments are
    /// dropped; use [`Vault::resolve`] where they must be rejected.
    pub fn abs_path(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|part| !matches!(*part, "" | "." | ".."))
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Absolute path of a vault-relative path that must stay below the root.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        join_contained(&self.root, rel).ok_or_else(|| VaultError::OutsideRoot {
            path: rel.to_string(),
        })
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.abs_path(rel).is_file()
    }

    /// Vault-relative path with forward slashes, if `path` lies under the root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        relative_to(&self.root, path)
    }

    /// Relative paths of every indexable document, sorted.
    pub fn document_paths(&self) -> Vec<String> {
        self.indexer
            .scan_vault_files(&self.root)
            .iter()
            .filter_map(|p| self.relative_path(p))
            .collect()
    }
}

/// `root` joined with a relative, forward-slash path; `None` if a `..` segment
/// would climb out of it.
pub fn join_contained(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part => path.push(part),
        }
    }
    Some(path)
}

/// `dir` expressed under `root` when it is (or resolves to) a directory inside it.
pub(crate) fn nested_under(root: &Path, dir: &Path) -> Option<PathBuf> {
    let root_abs = std::fs::canonicalize(root).ok()?;
    let dir_abs = std::fs::canonicalize(dir).ok()?;
    let rel = dir_abs.strip_prefix(&root_abs).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(rel))
}

pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Normalise user-supplied relative paths: backslashes, `./` and surrounding slashes.
pub fn normalize_rel(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}
