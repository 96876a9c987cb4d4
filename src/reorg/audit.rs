use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

use super::artifact;
use super::backup::Manifest;
use super::progress::{NoProgress, ProgressSink};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::logger::Logger;
use crate::vault::parser::REFERENCE_RE;
use crate::vault::Vault;

pub const REPORT_FILE: &str = "data_loss_report.json";
pub const CANDIDATES_FILE: &str = "data_loss_candidates.json";

static LINK_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[\[.*\]\]$").unwrap());
static LINK_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s*\[\[.*\]\]\s*$").unwrap());
static DATE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^date:\s*\[\[.*\]\]").unwrap());

/// Comparison of one document against its earlier copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossFinding {
    pub identical: bool,
    pub removed_links: Vec<String>,
    pub removed_line_count: usize,
    pub added_line_count: usize,
    pub expected_removal_count: usize,
    pub significant_removal_count: usize,
    /// Bounded sample of the significant removed lines.
    pub significant_removals: Vec<String>,
    pub has_data_loss: bool,
    pub backup_size: usize,
    pub current_size: usize,
    pub size_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossStatus {
    Identical,
    Different,
    Missing,
    NoBackup,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossEntry {
    pub file: String,
    pub backup: PathBuf,
    pub status: LossStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<LossFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One restoration candidate. Reads back as a `LossCandidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub file: String,
    pub significant_removal_count: usize,
    pub significant_removals: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossReport {
    pub source: String,
    pub total: usize,
    pub identical: usize,
    pub different: usize,
    pub missing: usize,
    pub no_backup: usize,
    pub errors: usize,
    pub data_loss_count: usize,
    pub entries: Vec<LossEntry>,
}

impl LossReport {
    pub fn candidates(&self) -> Vec<CandidateEntry> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let finding = entry.finding.as_ref().filter(|f| f.has_data_loss)?;
                Some(CandidateEntry {
                    file: entry.file.clone(),
                    significant_removal_count: finding.significant_removal_count,
                    significant_removals: finding.significant_removals.clone(),
                })
            })
            .collect()
    }
}

pub struct LossAuditor {
    config: AuditConfig,
    expected_tags: HashSet<String>,
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl LossAuditor {
    pub fn new(config: AuditConfig) -> Self {
        let expected_tags = config
            .expected_tags
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        Self {
            config,
            expected_tags,
            progress: Arc::new(NoProgress),
            logger: Logger::new("LossAuditor"),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Whether a removed line is an anticipated side effect of reorganization: blank
    /// lines, bare reference lines, common tag items, empty backlinks, linked dates.
    pub fn is_expected_removal(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || LINK_ONLY_RE.is_match(line) || LINK_ITEM_RE.is_match(line) {
            return true;
        }

        if let Some(item) = line.strip_prefix('-') {
            if self.expected_tags.contains(&item.trim().to_lowercase()) {
                return true;
            }
        }

        if line.to_lowercase().contains("backlink")
            && (line.contains("[[]]") || line.contains("''") || line.contains("\"\""))
        {
            return true;
        }

        DATE_LINK_RE.is_match(line)
    }

    pub fn compare(&self, backup: &str, current: &str) -> LossFinding {
        let backup_links = link_names(backup);
        let current_links = link_names(current);
        let removed_links: Vec<String> = backup_links.difference(&current_links).cloned().collect();

        let old_lines: Vec<&str> = backup.split('\n').map(str::trim_end).collect();
        let new_lines: Vec<&str> = current.split('\n').map(str::trim_end).collect();

        let mut finding = LossFinding {
            removed_links,
            backup_size: backup.len(),
            current_size: current.len(),
            size_delta: current.len() as i64 - backup.len() as i64,
            ..Default::default()
        };

        if old_lines == new_lines {
            finding.identical = true;
            return finding;
        }

        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_slices(old_lines.as_slice(), new_lines.as_slice());

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Delete => {
                    finding.removed_line_count += 1;
                    let line = change.value();
                    if self.is_expected_removal(line) {
                        finding.expected_removal_count += 1;
                    } else if line.trim().chars().count() > self.config.min_significant_len {
                        finding.significant_removal_count += 1;
                        if finding.significant_removals.len() < self.config.sample_limit {
                            finding.significant_removals.push(line.trim().to_string());
                        }
                    }
                }
                ChangeTag::Insert => finding.added_line_count += 1,
                ChangeTag::Equal => {}
            }
        }

        finding.has_data_loss = finding.significant_removal_count > 0;
        finding
    }

    async fn audit_pair(&self, file: String, backup: PathBuf, current: PathBuf) -> LossEntry {
        let mut entry = LossEntry {
            file,
            backup,
            status: LossStatus::Error,
            finding: None,
            error: None,
        };

        if !entry.backup.is_file() {
            entry.status = LossStatus::NoBackup;
            return entry;
        }
        if !current.is_file() {
            entry.status = LossStatus::Missing;
            return entry;
        }

        let backup_text = tokio::fs::read_to_string(&entry.backup).await;
        let current_text = tokio::fs::read_to_string(&current).await;
        match (backup_text, current_text) {
            (Ok(before), Ok(after)) => {
                let finding = self.compare(&before, &after);
                entry.status = if finding.identical {
                    LossStatus::Identical
                } else {
                    LossStatus::Different
                };
                entry.finding = Some(finding);
            }
            (Err(e), _) | (_, Err(e)) => entry.error = Some(e.to_string()),
        }
        entry
    }

    /// Compare every file recorded in `manifest` with its current version in `vault`.
    pub async fn audit_backup(
        &self,
        vault: &Vault,
        manifest: &Manifest,
        output_dir: &Path,
    ) -> Result<LossReport> {
        let pairs = manifest
            .files
            .iter()
            .map(|rel| (rel.clone(), manifest.backup_root.join(rel), vault.abs_path(rel)))
            .collect();
        self.audit_pairs("manifest", pairs, output_dir).await
    }

    /// Compare every single-file backup (`note.md.backup`) with its document.
    pub async fn audit_sibling_backups(
        &self,
        vault: &Vault,
        suffix: &str,
        output_dir: &Path,
    ) -> Result<LossReport> {
        let pairs = vault
            .indexer()
            .scan_backup_files(vault.root(), suffix)
            .into_iter()
            .filter_map(|backup| {
                let name = backup.file_name()?.to_str()?;
                let current = backup.with_file_name(&name[..name.len() - suffix.len()]);
                let rel = vault.relative_path(&current)?;
                Some((rel, backup, current))
            })
            .collect();
        self.audit_pairs("sibling_backups", pairs, output_dir).await
    }

    async fn audit_pairs(
        &self,
        source: &str,
        pairs: Vec<(String, PathBuf, PathBuf)>,
        output_dir: &Path,
    ) -> Result<LossReport> {
        let total = pairs.len();
        let mut report = LossReport {
            source: source.to_string(),
            total,
            ..Default::default()
        };

        for (i, (file, backup, current)) in pairs.into_iter().enumerate() {
            let entry = self.audit_pair(file, backup, current).await;
            match entry.status {
                LossStatus::Identical => report.identical += 1,
                LossStatus::Different => report.different += 1,
                LossStatus::Missing => report.missing += 1,
                LossStatus::NoBackup => report.no_backup += 1,
                LossStatus::Error => report.errors += 1,
            }
            if entry.finding.as_ref().is_some_and(|f| f.has_data_loss) {
                report.data_loss_count += 1;
            }
            report.entries.push(entry);
            self.progress.advance("audit", i + 1, total);
        }

        artifact::write_json(&output_dir.join(REPORT_FILE), &report).await?;
        artifact::write_json(&output_dir.join(CANDIDATES_FILE), &report.candidates()).await?;

        self.logger.info(&format!(
            "Audited {} documents: {} identical, {} different, {} missing, {} without backup, {} errors",
            report.total,
            report.identical,
            report.different,
            report.missing,
            report.no_backup,
            report.errors
        ));
        if report.data_loss_count > 0 {
            self.logger.warn(&format!(
                "{} documents lost substantive content; see {}",
                report.data_loss_count,
                output_dir.join(CANDIDATES_FILE).display()
            ));
        }
        artifact::log_failures(
            &self.logger,
            report
                .entries
                .iter()
                .filter_map(|e| e.error.as_deref().map(|err| (e.file.as_str(), err))),
        );

        Ok(report)
    }
}

/// Reference targets (display text dropped), as a sorted set.
fn link_names(content: &str) -> BTreeSet<String> {
    REFERENCE_RE
        .captures_iter(content)
        .map(|cap| {
            let inner = &cap[1];
            inner.split('|').next().unwrap_or(inner).trim().to_string()
        })
        .collect()
}
