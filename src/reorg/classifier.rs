use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::artifact::{self, FileFailure};
use super::progress::{NoProgress, ProgressSink};
use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::logger::Logger;
use crate::vault::links::file_name;
use crate::vault::parser::{extract_headings, extract_references, has_heading};
use crate::vault::{Document, Metadata, Vault};

pub const INDEX_DOCUMENTS_FILE: &str = "index_documents.json";
pub const REGULAR_DOCUMENTS_FILE: &str = "regular_documents.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyReason {
    FilenameMarker,
    MarkerTag,
    MarkerContentType,
    LinkDense,
    IndexSections,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_index: bool,
    pub reasons: BTreeSet<ClassifyReason>,
}

/// One row of the persisted classification lists. Reads back as a `NoteEntry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    pub file: String,
    pub filename: String,
    pub is_moc: bool,
    pub reasons: BTreeSet<ClassifyReason>,
    pub internal_links_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub total: usize,
    pub index_documents: Vec<ClassifiedDocument>,
    pub regular_documents: Vec<ClassifiedDocument>,
    pub failures: Vec<FileFailure>,
}

pub struct Classifier {
    config: ClassifierConfig,
    tag_field: String,
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            tag_field: "tags".to_string(),
            progress: Arc::new(NoProgress),
            logger: Logger::new("Classifier"),
        }
    }

    pub fn with_tag_field(mut self, field: &str) -> Self {
        self.tag_field = field.to_string();
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Decide whether a document is an index ("map of content") document. Every
    /// matching signal is recorded; any one of them is sufficient.
    pub fn classify(&self, path: &str, metadata: Option<&Metadata>, body: &str) -> Classification {
        let marker = self.config.index_marker.to_lowercase();
        let mut reasons = BTreeSet::new();

        if file_name(path).to_lowercase().contains(&marker) {
            reasons.insert(ClassifyReason::FilenameMarker);
        }

        if let Some(metadata) = metadata {
            let tagged = metadata
                .string_list(&self.tag_field)
                .unwrap_or_default()
                .iter()
                .any(|tag| tag.trim().to_lowercase() == marker);
            if tagged {
                reasons.insert(ClassifyReason::MarkerTag);
            }

            if metadata.get_str(&self.config.type_field).as_deref()
                == Some(self.config.index_marker.as_str())
            {
                reasons.insert(ClassifyReason::MarkerContentType);
            }
        }

        if distinct_targets(body) >= self.config.link_threshold {
            reasons.insert(ClassifyReason::LinkDense);
        }

        let headings = extract_headings(body);
        if self
            .config
            .section_titles
            .iter()
            .any(|title| has_heading(&headings, self.config.section_level, title))
        {
            reasons.insert(ClassifyReason::IndexSections);
        }

        Classification {
            is_index: !reasons.is_empty(),
            reasons,
        }
    }

    /// Classify every document and persist the index/regular lists under `output_dir`.
    pub async fn classify_vault(&self, vault: &Vault, output_dir: &Path) -> Result<ClassificationReport> {
        let paths = vault.document_paths();
        let total = paths.len();
        let mut report = ClassificationReport {
            total,
            ..Default::default()
        };

        for (i, rel) in paths.into_iter().enumerate() {
            match Document::read(&vault.abs_path(&rel)).await {
                Ok(doc) => {
                    let classification = self.classify(&rel, doc.metadata.as_ref(), &doc.body);
                    let entry = ClassifiedDocument {
                        filename: file_name(&rel).to_string(),
                        is_moc: classification.is_index,
                        reasons: classification.reasons,
                        internal_links_count: doc.references().len(),
                        file: rel,
                    };
                    if entry.is_moc {
                        report.index_documents.push(entry);
                    } else {
                        report.regular_documents.push(entry);
                    }
                }
                Err(e) => report.failures.push(FileFailure::new(rel, e)),
            }
            self.progress.advance("classify", i + 1, total);
        }

        artifact::write_json(&output_dir.join(INDEX_DOCUMENTS_FILE), &report.index_documents).await?;
        artifact::write_json(&output_dir.join(REGULAR_DOCUMENTS_FILE), &report.regular_documents)
            .await?;

        self.logger.info(&format!(
            "Classified {} documents: {} index, {} regular",
            total,
            report.index_documents.len(),
            report.regular_documents.len()
        ));
        artifact::log_failures(
            &self.logger,
            report
                .failures
                .iter()
                .map(|f| (f.path.as_str(), f.error.as_str())),
        );

        Ok(report)
    }
}

fn distinct_targets(body: &str) -> usize {
    extract_references(body)
        .iter()
        .map(|r| r.target.trim().to_string())
        .collect::<HashSet<_>>()
        .len()
}
