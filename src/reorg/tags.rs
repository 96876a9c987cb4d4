use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use yaml_rust::Yaml;

use super::artifact;
use super::progress::{NoProgress, ProgressSink};
use super::suggestions::TagSuggestion;
use crate::config::TagConfig;
use crate::error::{Result, VaultError};
use crate::logger::Logger;
use crate::vault::parser::{serialize, split_frontmatter, string_list_yaml, Frontmatter};
use crate::vault::{fsutil, Metadata, Vault};

/// Union of `existing` and `proposed`, deduplicated case-insensitively (the first
/// spelling seen wins) and sorted case-insensitively.
pub fn merge_tags<S: AsRef<str>, P: AsRef<str>>(existing: &[S], proposed: &[P]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged: Vec<String> = existing
        .iter()
        .map(|t| t.as_ref())
        .chain(proposed.iter().map(|t| t.as_ref()))
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(str::to_string)
        .collect();
    merged.sort_by_key(|tag| tag.to_lowercase());
    merged
}

/// Whether two tag lists differ as case-insensitive sets.
pub fn tags_changed<S: AsRef<str>, P: AsRef<str>>(before: &[S], after: &[P]) -> bool {
    let before: HashSet<String> = before.iter().map(|t| t.as_ref().to_lowercase()).collect();
    let after: HashSet<String> = after.iter().map(|t| t.as_ref().to_lowercase()).collect();
    before != after
}

/// Proposed backlink in reference form, and whether it differs from `existing`.
pub fn merge_backlink(existing: Option<&str>, proposed: &str) -> (String, bool) {
    let formatted = if proposed.starts_with("[[") {
        proposed.to_string()
    } else {
        format!("[[{}]]", proposed)
    };
    let current = existing
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    let changed = current != formatted;
    (formatted, changed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Updated,
    WouldUpdate,
    NoChange,
    NotFound,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagApplyResult {
    pub file: String,
    pub status: TagStatus,
    #[serde(default)]
    pub existing_tags: Vec<String>,
    #[serde(default)]
    pub added_tags: Vec<String>,
    #[serde(default)]
    pub final_tags: Vec<String>,
    #[serde(default)]
    pub backlink_added: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TagApplyResult {
    fn failed(file: &str, err: &VaultError) -> Self {
        let status = match err {
            VaultError::NotFound { .. } => TagStatus::NotFound,
            _ => TagStatus::Error,
        };
        Self {
            file: file.to_string(),
            status,
            existing_tags: Vec::new(),
            added_tags: Vec::new(),
            final_tags: Vec::new(),
            backlink_added: false,
            backlink: None,
            backup: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagApplyReport {
    pub dry_run: bool,
    pub total: usize,
    pub updated: usize,
    pub would_update: usize,
    pub no_change: usize,
    pub not_found: usize,
    pub errors: usize,
    pub skipped: usize,
    pub total_tags_added: usize,
    pub total_backlinks_added: usize,
    pub results: Vec<TagApplyResult>,
}

pub struct TagMerger {
    config: TagConfig,
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl TagMerger {
    pub fn new(config: TagConfig) -> Self {
        Self {
            config,
            progress: Arc::new(NoProgress),
            logger: Logger::new("TagMerger"),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Merge `tags` and `backlink` into one document's metadata. Failures are reported
    /// through the result status.
    pub async fn apply(
        &self,
        vault: &Vault,
        rel: &str,
        tags: &[String],
        backlink: Option<&str>,
        dry_run: bool,
    ) -> TagApplyResult {
        match self.try_apply(vault, rel, tags, backlink, dry_run).await {
            Ok(result) => result,
            Err(e) => {
                self.logger.debug(&format!("{}: {}", rel, e));
                TagApplyResult::failed(rel, &e)
            }
        }
    }

    async fn try_apply(
        &self,
        vault: &Vault,
        rel: &str,
        tags: &[String],
        backlink: Option<&str>,
        dry_run: bool,
    ) -> Result<TagApplyResult> {
        let path = vault.resolve(rel)?;
        if !path.is_file() {
            return Err(VaultError::NotFound {
                path: rel.to_string(),
            });
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| VaultError::io(&path, e))?;

        let (mut metadata, body) = match split_frontmatter(&content) {
            Frontmatter::Absent => (Metadata::new(), content.as_str()),
            Frontmatter::Present { metadata, body } => (metadata, body),
            Frontmatter::Malformed { reason } => {
                return Err(VaultError::ParseFailure {
                    path: rel.to_string(),
                    reason,
                })
            }
        };

        let existing_tags = match metadata.get(&self.config.field) {
            None => Vec::new(),
            Some(Yaml::Hash(_)) => {
                return Err(VaultError::ParseFailure {
                    path: rel.to_string(),
                    reason: format!("\"{}\" is a mapping", self.config.field),
                })
            }
            Some(_) => metadata
                .string_list(&self.config.field)
                .unwrap_or_default(),
        };

        let final_tags = merge_tags(&existing_tags, tags);
        let tags_differ = tags_changed(&existing_tags, &final_tags);

        let proposed_backlink = backlink.map(str::trim).filter(|b| !b.is_empty());
        let (backlink_value, backlink_differs) = match proposed_backlink {
            Some(proposed) => {
                let current = metadata.get_str(&self.config.backlink_field);
                let (value, changed) = merge_backlink(current.as_deref(), proposed);
                (Some(value), changed)
            }
            None => (None, false),
        };

        let existing_lower: HashSet<String> =
            existing_tags.iter().map(|t| t.to_lowercase()).collect();
        let added_tags: Vec<String> = final_tags
            .iter()
            .filter(|t| !existing_lower.contains(&t.to_lowercase()))
            .cloned()
            .collect();

        let mut result = TagApplyResult {
            file: rel.to_string(),
            status: TagStatus::NoChange,
            existing_tags,
            added_tags,
            final_tags,
            backlink_added: false,
            backlink: backlink_value.clone(),
            backup: None,
            error: None,
        };

        if !tags_differ && !backlink_differs {
            result.added_tags.clear();
            return Ok(result);
        }

        if tags_differ || metadata.contains_key(&self.config.field) {
            metadata.set(&self.config.field, string_list_yaml(&result.final_tags));
        }
        if let (true, Some(value)) = (backlink_differs, backlink_value) {
            metadata.set(&self.config.backlink_field, Yaml::String(value));
            result.backlink_added = true;
        }

        let updated = serialize(Some(&metadata), body)?;

        if dry_run {
            result.status = TagStatus::WouldUpdate;
            return Ok(result);
        }

        let backup_path = fsutil::with_suffix(&path, &self.config.backup_suffix);
        fsutil::write_atomic(&backup_path, &content).await?;
        fsutil::write_atomic(&path, &updated).await?;

        result.backup = Some(format!("{}{}", rel, self.config.backup_suffix));
        result.status = TagStatus::Updated;
        Ok(result)
    }

    pub async fn apply_suggestions(
        &self,
        vault: &Vault,
        suggestions: &[TagSuggestion],
        dry_run: bool,
    ) -> TagApplyReport {
        let total = suggestions.len();
        let mut report = TagApplyReport {
            dry_run,
            total,
            ..Default::default()
        };

        self.logger.info(&format!(
            "Applying tags to {} documents{}",
            total,
            if dry_run { " (dry run)" } else { "" }
        ));

        for (i, suggestion) in suggestions.iter().enumerate() {
            let backlink = suggestion
                .suggested_backlink
                .as_deref()
                .filter(|b| !b.trim().is_empty());
            if suggestion.suggested_tags.is_empty() && backlink.is_none() {
                report.skipped += 1;
                continue;
            }

            let result = self
                .apply(vault, &suggestion.file, &suggestion.suggested_tags, backlink, dry_run)
                .await;
            match result.status {
                TagStatus::Updated => report.updated += 1,
                TagStatus::WouldUpdate => report.would_update += 1,
                TagStatus::NoChange => report.no_change += 1,
                TagStatus::NotFound => report.not_found += 1,
                TagStatus::Error => report.errors += 1,
            }
            report.total_tags_added += result.added_tags.len();
            if result.backlink_added {
                report.total_backlinks_added += 1;
            }
            report.results.push(result);
            self.progress.advance("tags", i + 1, total);
        }

        self.logger.info(&format!(
            "Tags: {} updated, {} would update, {} unchanged, {} not found, {} errors, {} tags added, {} backlinks added",
            report.updated,
            report.would_update,
            report.no_change,
            report.not_found,
            report.errors,
            report.total_tags_added,
            report.total_backlinks_added
        ));
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
