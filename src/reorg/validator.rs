use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use yaml_rust::Yaml;

use super::artifact;
use super::progress::{NoProgress, ProgressSink};
use super::suggestions::NoteEntry;
use crate::config::ValidationConfig;
use crate::logger::Logger;
use crate::vault::parser::{
    extract_headings, extract_references, has_heading, scalar_to_string, split_frontmatter,
    Frontmatter,
};
use crate::vault::{join_contained, normalize_rel, Metadata, Vault};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Issues,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssues {
    pub metadata_structure: Vec<String>,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub accessibility: Vec<String>,
}

impl ValidationIssues {
    pub fn total(&self) -> usize {
        self.metadata_structure.len() + self.tags.len() + self.links.len() + self.accessibility.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub file: String,
    pub is_index: bool,
    pub status: ValidationStatus,
    pub issues: ValidationIssues,
    pub total_issues: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueCounts {
    pub metadata_structure: usize,
    pub tags: usize,
    pub links: usize,
    pub accessibility: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: usize,
    pub with_issues: usize,
    pub errors: usize,
    pub issue_counts: IssueCounts,
    pub results: Vec<ValidationResult>,
}

pub struct Validator {
    config: ValidationConfig,
    tag_field: String,
    index_marker: String,
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            tag_field: "tags".to_string(),
            index_marker: "MoC".to_string(),
            progress: Arc::new(NoProgress),
            logger: Logger::new("Validator"),
        }
    }

    pub fn with_tag_field(mut self, field: &str) -> Self {
        self.tag_field = field.to_string();
        self
    }

    pub fn with_index_marker(mut self, marker: &str) -> Self {
        self.index_marker = marker.to_string();
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Check one document. Accessibility failures short-circuit with status `error`.
    pub async fn validate(&self, vault: &Vault, rel: &str, is_index: bool) -> ValidationResult {
        let rel = normalize_rel(rel);
        let mut issues = ValidationIssues::default();

        let content = match read_accessible(vault, &rel).await {
            Ok(content) => content,
            Err(problem) => {
                issues.accessibility.push(problem);
                return finish(rel, is_index, issues, ValidationStatus::Error);
            }
        };

        let (metadata, body) = match split_frontmatter(&content) {
            Frontmatter::Present { metadata, body } => (Some(metadata), body),
            Frontmatter::Absent => {
                issues
                    .metadata_structure
                    .push("Missing metadata block".to_string());
                (None, content.as_str())
            }
            Frontmatter::Malformed { reason } => {
                issues
                    .metadata_structure
                    .push(format!("Malformed metadata block: {}", reason));
                return finish(rel, is_index, issues, ValidationStatus::Issues);
            }
        };

        if let Some(metadata) = &metadata {
            issues.metadata_structure = self.check_structure(metadata, body, is_index);
            issues.tags = self.check_tags(metadata);
        }
        issues.links = self.check_links(vault, body);

        let status = if issues.total() == 0 {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Issues
        };
        finish(rel, is_index, issues, status)
    }

    fn check_structure(&self, metadata: &Metadata, body: &str, is_index: bool) -> Vec<String> {
        let mut issues = Vec::new();

        if !metadata.contains_key(&self.config.created_field) {
            issues.push(format!("Missing \"{}\" field", self.config.created_field));
        }

        let (sections, level) = if is_index {
            match metadata.string_list(&self.tag_field) {
                None if !metadata.contains_key(&self.tag_field) => {
                    issues.push(format!("Missing \"{}\" field", self.tag_field));
                }
                tags => {
                    let marker = self.index_marker.to_lowercase();
                    let tagged = tags
                        .unwrap_or_default()
                        .iter()
                        .any(|t| t.trim().to_lowercase() == marker);
                    if !tagged {
                        issues.push(format!(
                            "Index document missing \"{}\" tag",
                            self.index_marker
                        ));
                    }
                }
            }
            (&self.config.index_sections, self.config.index_section_level)
        } else {
            (&self.config.regular_sections, self.config.regular_section_level)
        };

        let headings = extract_headings(body);
        let hashes = "#".repeat(level as usize);
        for title in sections {
            if !has_heading(&headings, level, title) {
                issues.push(format!("Missing \"{} {}\" section", hashes, title));
            }
        }

        issues
    }

    fn check_tags(&self, metadata: &Metadata) -> Vec<String> {
        let mut issues = Vec::new();
        let items = match metadata.get(&self.tag_field) {
            None | Some(Yaml::Null) => return issues,
            Some(Yaml::Array(items)) => items,
            Some(_) => {
                issues.push("Tags should be a list".to_string());
                return issues;
            }
        };

        let rendered: Vec<String> = items
            .iter()
            .map(|item| scalar_to_string(item).unwrap_or_default())
            .collect();

        if rendered.iter().any(|t| t.trim().is_empty()) {
            issues.push("Empty tag found".to_string());
        }
        let mut seen = HashSet::new();
        if !rendered.iter().all(|t| seen.insert(t.to_lowercase())) {
            issues.push("Duplicate tags found".to_string());
        }

        issues
    }

    fn check_links(&self, vault: &Vault, body: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        extract_references(body)
            .iter()
            .map(|r| r.note().trim().to_string())
            .filter(|target| !target.is_empty() && seen.insert(target.clone()))
            .filter(|target| !self.resolves(vault, target))
            .map(|target| format!("Broken link: [[{}]]", target))
            .collect()
    }

    fn resolves(&self, vault: &Vault, target: &str) -> bool {
        let extension = vault.extension();
        let as_file = join_contained(vault.root(), &format!("{}.{}", target, extension));
        let as_folder = join_contained(vault.root(), target)
            .map(|dir| dir.join(format!("index.{}", extension)));
        as_file.is_some_and(|p| p.exists()) || as_folder.is_some_and(|p| p.exists())
    }

    /// Validate every listed document; `default_is_index` applies where an entry does
    /// not say. Listed files that are missing are reported as errors.
    pub async fn validate_notes(
        &self,
        vault: &Vault,
        entries: &[NoteEntry],
        default_is_index: bool,
    ) -> ValidationReport {
        let total = entries.len();
        let mut report = ValidationReport {
            total,
            ..Default::default()
        };

        for (i, entry) in entries.iter().enumerate() {
            let is_index = entry.is_moc.unwrap_or(default_is_index);
            let result = self.validate(vault, &entry.file, is_index).await;

            match result.status {
                ValidationStatus::Valid => report.valid += 1,
                ValidationStatus::Issues => report.with_issues += 1,
                ValidationStatus::Error => report.errors += 1,
            }
            report.issue_counts.metadata_structure += result.issues.metadata_structure.len();
            report.issue_counts.tags += result.issues.tags.len();
            report.issue_counts.links += result.issues.links.len();
            report.issue_counts.accessibility += result.issues.accessibility.len();
            report.results.push(result);
            self.progress.advance("validate", i + 1, total);
        }

        self.logger.info(&format!(
            "Validated {} documents: {} valid, {} with issues, {} errors",
            report.total, report.valid, report.with_issues, report.errors
        ));
        self.logger.info(&format!(
            "Issues: {} structure, {} tags, {} links, {} accessibility",
            report.issue_counts.metadata_structure,
            report.issue_counts.tags,
            report.issue_counts.links,
            report.issue_counts.accessibility
        ));
        artifact::log_failures(
            &self.logger,
            report
                .results
                .iter()
                .filter(|r| r.status == ValidationStatus::Error)
                .filter_map(|r| {
                    r.issues
                        .accessibility
                        .first()
                        .map(|e| (r.file.as_str(), e.as_str()))
                }),
        );

        report
    }
}

async fn read_accessible(vault: &Vault, rel: &str) -> std::result::Result<String, String> {
    let path = vault.resolve(rel).map_err(|e| e.to_string())?;
    if !path.exists() {
        return Err("File does not exist".to_string());
    }
    if !path.is_file() {
        return Err("Path is not a file".to_string());
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("Cannot read file: {}", e))?;
    if bytes.is_empty() {
        return Err("File is empty".to_string());
    }
    String::from_utf8(bytes).map_err(|_| "File is not valid UTF-8".to_string())
}

fn finish(
    file: String,
    is_index: bool,
    issues: ValidationIssues,
    status: ValidationStatus,
) -> ValidationResult {
    ValidationResult {
        file,
        is_index,
        status,
        total_issues: issues.total(),
        issues,
    }
}
