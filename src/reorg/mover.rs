use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::artifact::{self, FileFailure};
use super::progress::{NoProgress, ProgressSink};
use super::suggestions::FolderSuggestion;
use crate::error::{Result, VaultError};
use crate::logger::Logger;
use crate::vault::links::{file_name, rewrite_references, LinkMapping, MoveRecord};
use crate::vault::parser::{extract_references, parse};
use crate::vault::{fsutil, normalize_rel, Vault};

pub const LEDGER_FILE: &str = "link_updates.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Moved,
    WouldMove,
    Unchanged,
    NotFound,
    Conflict,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedFile {
    pub file: String,
    pub updates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub file: String,
    pub target: String,
    pub status: MoveStatus,
    pub moved_file_link_updates: usize,
    pub other_files_link_updates: usize,
    pub total_link_updates: usize,
    pub outgoing_references: usize,
    #[serde(default)]
    pub updated_files: Vec<UpdatedFile>,
    #[serde(default)]
    pub failures: Vec<FileFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MoveResult {
    fn new(record: &MoveRecord, status: MoveStatus) -> Self {
        Self {
            file: record.source_path.clone(),
            target: record.target_path.clone(),
            status,
            moved_file_link_updates: 0,
            other_files_link_updates: 0,
            total_link_updates: 0,
            outgoing_references: 0,
            updated_files: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    fn failed(record: &MoveRecord, err: &VaultError) -> Self {
        let status = match err {
            VaultError::NotFound { .. } => MoveStatus::NotFound,
            VaultError::Conflict { .. } => MoveStatus::Conflict,
            _ => MoveStatus::Error,
        };
        let mut result = Self::new(record, status);
        result.error = Some(err.to_string());
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub file: String,
    pub target: String,
    pub link_updates: usize,
}

/// Record of every move that rewrote references; the only trace of relocations,
/// since a snapshot restore does not undo them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdateLedger {
    pub dry_run: bool,
    pub created_at: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveReport {
    pub dry_run: bool,
    pub total: usize,
    pub moved: usize,
    pub would_move: usize,
    pub unchanged: usize,
    pub not_found: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub total_link_updates: usize,
    pub results: Vec<MoveResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<PathBuf>,
}

pub struct MoveEngine {
    progress: Arc<dyn ProgressSink>,
    logger: Logger,
}

impl MoveEngine {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoProgress),
            logger: Logger::new("MoveEngine"),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Relocate `source` to `target` and rewrite every reference to it across
    /// `all_paths`. A dry run reads the same files and reports identical counts
    /// without writing anything.
    pub async fn move_document(
        &self,
        vault: &Vault,
        source: &str,
        target: &str,
        all_paths: &[String],
        dry_run: bool,
    ) -> Result<MoveResult> {
        let record = MoveRecord::new(normalize_rel(source), normalize_rel(target));
        let source_abs = vault.resolve(&record.source_path)?;
        let target_abs = vault.resolve(&record.target_path)?;

        if !source_abs.is_file() {
            return Err(VaultError::NotFound {
                path: record.source_path.clone(),
            });
        }
        if record.source_path == record.target_path {
            return Ok(MoveResult::new(&record, MoveStatus::Unchanged));
        }
        if target_abs.exists() {
            return Err(VaultError::Conflict {
                target: record.target_path.clone(),
                reason: "destination already exists".to_string(),
            });
        }

        let content = tokio::fs::read_to_string(&source_abs)
            .await
            .map_err(|e| VaultError::io(&source_abs, e))?;
        let (_, body) = parse(&content);

        let mapping = LinkMapping::for_move(&record);
        let mut result = MoveResult::new(
            &record,
            if dry_run {
                MoveStatus::WouldMove
            } else {
                MoveStatus::Moved
            },
        );
        result.outgoing_references = extract_references(&body).len();

        if !dry_run {
            fsutil::relocate(&source_abs, &target_abs).await?;
            self.logger.debug(&format!(
                "Moved {} -> {}",
                record.source_path, record.target_path
            ));
        }

        let (rewritten, count) = rewrite_references(&content, &mapping);
        result.moved_file_link_updates = count;
        if !dry_run && count > 0 {
            if let Err(e) = fsutil::write_atomic(&target_abs, &rewritten).await {
                result
                    .failures
                    .push(FileFailure::new(record.target_path.clone(), e));
            }
        }

        let others: Vec<&String> = all_paths
            .iter()
            .filter(|p| **p != record.source_path && **p != record.target_path)
            .collect();
        let total = others.len();

        for (i, rel) in others.into_iter().enumerate() {
            match self.rewrite_other(vault, rel, &mapping, dry_run).await {
                Ok(0) => {}
                Ok(updates) => {
                    result.other_files_link_updates += updates;
                    result.updated_files.push(UpdatedFile {
                        file: rel.clone(),
                        updates,
                    });
                }
                Err(e) => result.failures.push(FileFailure::new(rel.clone(), e)),
            }
            self.progress.advance("rewrite", i + 1, total);
        }

        result.total_link_updates = result.moved_file_link_updates + result.other_files_link_updates;
        Ok(result)
    }

    async fn rewrite_other(
        &self,
        vault: &Vault,
        rel: &str,
        mapping: &LinkMapping,
        dry_run: bool,
    ) -> Result<usize> {
        let path = vault.abs_path(rel);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| VaultError::io(&path, e))?;
        if !mapping.may_apply_to(&content) {
            return Ok(0);
        }

        let (rewritten, count) = rewrite_references(&content, mapping);
        if count > 0 && !dry_run {
            fsutil::write_atomic(&path, &rewritten).await?;
        }
        Ok(count)
    }

    /// Apply folder suggestions as a batch. Moves that collide with each other or
    /// with existing documents are reported as conflicts and never executed.
    pub async fn move_from_suggestions(
        &self,
        vault: &Vault,
        suggestions: &[FolderSuggestion],
        dry_run: bool,
        ledger_path: Option<&Path>,
    ) -> Result<MoveReport> {
        let records: Vec<MoveRecord> = suggestions
            .iter()
            .filter(|s| s.folder_change_needed)
            .map(|s| {
                let source = normalize_rel(&s.file);
                let folder = normalize_rel(&s.suggested_folder);
                let name = file_name(&source).to_string();
                let target = if folder.is_empty() {
                    name
                } else {
                    format!("{}/{}", folder, name)
                };
                MoveRecord::new(source, target)
            })
            .collect();

        let conflicts = plan_conflicts(vault, &records);
        let total = records.len();
        let mut report = MoveReport {
            dry_run,
            total,
            ..Default::default()
        };

        self.logger.info(&format!(
            "Planning {} moves{}: {} conflicting",
            total,
            if dry_run { " (dry run)" } else { "" },
            conflicts.len()
        ));

        let mut all_paths = vault.document_paths();

        for (i, record) in records.iter().enumerate() {
            let result = match conflicts.get(&i) {
                Some(reason) => MoveResult::failed(
                    record,
                    &VaultError::Conflict {
                        target: record.target_path.clone(),
                        reason: reason.clone(),
                    },
                ),
                None => match self
                    .move_document(
                        vault,
                        &record.source_path,
                        &record.target_path,
                        &all_paths,
                        dry_run,
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(e) => MoveResult::failed(record, &e),
                },
            };

            match result.status {
                MoveStatus::Moved => {
                    report.moved += 1;
                    all_paths = vault.document_paths();
                }
                MoveStatus::WouldMove => report.would_move += 1,
                MoveStatus::Unchanged => report.unchanged += 1,
                MoveStatus::NotFound => report.not_found += 1,
                MoveStatus::Conflict => report.conflicts += 1,
                MoveStatus::Error => report.errors += 1,
            }
            report.total_link_updates += result.total_link_updates;
            report.results.push(result);
            self.progress.advance("move", i + 1, total);
        }

        let entries: Vec<LedgerEntry> = report
            .results
            .iter()
            .filter(|r| r.total_link_updates > 0)
            .map(|r| LedgerEntry {
                file: r.file.clone(),
                target: r.target.clone(),
                link_updates: r.total_link_updates,
            })
            .collect();

        if let (Some(path), false) = (ledger_path, entries.is_empty()) {
            let ledger = LinkUpdateLedger {
                dry_run,
                created_at: chrono::Local::now().to_rfc3339(),
                entries,
            };
            artifact::write_json(path, &ledger).await?;
            report.ledger = Some(path.to_path_buf());
        }

        self.logger.info(&format!(
            "Moves: {} moved, {} would move, {} conflicts, {} not found, {} errors, {} link updates",
            report.moved,
            report.would_move,
            report.conflicts,
            report.not_found,
            report.errors,
            report.total_link_updates
        ));
        artifact::log_failures(
            &self.logger,
            report
                .results
                .iter()
                .filter_map(|r| r.error.as_deref().map(|e| (r.file.as_str(), e))),
        );

        Ok(report)
    }
}

impl Default for MoveEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of every conflicting move -> reason.
fn plan_conflicts(vault: &Vault, records: &[MoveRecord]) -> BTreeMap<usize, String> {
    let mut conflicts = BTreeMap::new();
    let active: Vec<usize> = (0..records.len())
        .filter(|&i| records[i].source_path != records[i].target_path)
        .collect();

    let mut by_target: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &i in &active {
        by_target
            .entry(records[i].target_path.as_str())
            .or_default()
            .push(i);
    }
    for (target, indices) in &by_target {
        if indices.len() > 1 {
            for &i in indices {
                conflicts
                    .entry(i)
                    .or_insert_with(|| format!("{} moves share the destination {}", indices.len(), target));
            }
        }
    }

    for &i in &active {
        if vault.abs_path(&records[i].target_path).exists() {
            conflicts
                .entry(i)
                .or_insert_with(|| "destination already exists".to_string());
        }
    }

    // Reference-name collisions: the rewrite would be ambiguous in either direction.
    let mut new_to_old: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut old_to_new: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut owners: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &i in &active {
        for (old, new) in LinkMapping::for_move(&records[i]).iter() {
            new_to_old.entry(new.to_string()).or_default().insert(old.to_string());
            old_to_new.entry(old.to_string()).or_default().insert(new.to_string());
            owners.entry(format!("old:{}", old)).or_default().push(i);
            owners.entry(format!("new:{}", new)).or_default().push(i);
        }
    }
    for (new, olds) in &new_to_old {
        if olds.len() > 1 {
            for &i in &owners[&format!("new:{}", new)] {
                conflicts
                    .entry(i)
                    .or_insert_with(|| format!("several references would be renamed to [[{}]]", new));
            }
        }
    }
    for (old, news) in &old_to_new {
        if news.len() > 1 {
            for &i in &owners[&format!("old:{}", old)] {
                conflicts
                    .entry(i)
                    .or_insert_with(|| format!("[[{}]] would be renamed in different ways", old));
            }
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        fs::read_to_string(root.join(rel)).unwrap()
    }

    fn suggestion(file: &str, folder: &str) -> FolderSuggestion {
        FolderSuggestion {
            file: file.to_string(),
            suggested_folder: folder.to_string(),
            folder_change_needed: true,
        }
    }

    #[tokio::test]
    async fn test_move_rewrites_references() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A.md", "See [[B]] and [[B|Beta]].");
        write(dir.path(), "B.md", "---\ntags: [b]\n---\nLinks to [[A]] and [[B#Top]].\n");
        let vault = Vault::open(dir.path()).unwrap();
        let paths = vault.document_paths();

        let result = MoveEngine::new()
            .move_document(&vault, "B.md", "folder/B.md", &paths, false)
            .await
            .unwrap();

        assert_eq!(result.status, MoveStatus::Moved);
        assert_eq!(result.other_files_link_updates, 2);
        assert_eq!(result.moved_file_link_updates, 1);
        assert_eq!(result.total_link_updates, 3);
        assert_eq!(result.outgoing_references, 2);
        assert_eq!(read(dir.path(), "A.md"), "See [[folder/B]] and [[folder/B|Beta]].");
        assert_eq!(
            read(dir.path(), "folder/B.md"),
            "---\ntags: [b]\n---\nLinks to [[A]] and [[folder/B#Top]].\n"
        );
        assert!(!dir.path().join("B.md").exists());
    }

    #[tokio::test]
    async fn test_dry_run_reports_same_counts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A.md", "See [[B]] and [[B|Beta]].");
        write(dir.path(), "B.md", "body");
        let vault = Vault::open(dir.path()).unwrap();
        let paths = vault.document_paths();

        let result = MoveEngine::new()
            .move_document(&vault, "B.md", "folder/B.md", &paths, true)
            .await
            .unwrap();

        assert_eq!(result.status, MoveStatus::WouldMove);
        assert_eq!(result.other_files_link_updates, 2);
        assert_eq!(read(dir.path(), "A.md"), "See [[B]] and [[B|Beta]].");
        assert!(dir.path().join("B.md").exists());
        assert!(!dir.path().join("folder").exists());
    }

    #[tokio::test]
    async fn test_missing_source_and_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A.md", "a");
        write(dir.path(), "x/A.md", "other");
        let vault = Vault::open(dir.path()).unwrap();
        let paths = vault.document_paths();
        let engine = MoveEngine::new();

        let missing = engine
            .move_document(&vault, "nope.md", "x/nope.md", &paths, false)
            .await;
        assert!(matches!(missing, Err(VaultError::NotFound { .. })));

        let conflict = engine
            .move_document(&vault, "A.md", "x/A.md", &paths, false)
            .await;
        assert!(matches!(conflict, Err(VaultError::Conflict { .. })));
        assert_eq!(read(dir.path(), "x/A.md"), "other");
        assert_eq!(read(dir.path(), "A.md"), "a");
    }

    #[tokio::test]
    async fn test_same_source_and_target_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x/A.md", "[[A]]");
        let vault = Vault::open(dir.path()).unwrap();
        let paths = vault.document_paths();

        let result = MoveEngine::new()
            .move_document(&vault, "x/A.md", "./x/A.md", &paths, false)
            .await
            .unwrap();
        assert_eq!(result.status, MoveStatus::Unchanged);
        assert_eq!(result.total_link_updates, 0);
    }

    #[tokio::test]
    async fn test_batch_conflicts_are_not_executed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one/Note.md", "first");
        write(dir.path(), "two/Note.md", "second");
        write(dir.path(), "Lonely.md", "[[one/Note]]");
        write(dir.path(), "taken/Lonely.md", "occupied");
        write(dir.path(), "Free.md", "free");
        write(dir.path(), "Hub.md", "[[Free]] [[one/Note]]");
        let vault = Vault::open(dir.path()).unwrap();

        let suggestions = vec![
            suggestion("one/Note.md", "merged"),
            suggestion("two/Note.md", "merged"),
            suggestion("Lonely.md", "taken"),
            suggestion("Free.md", "/areas/"),
            FolderSuggestion {
                file: "Hub.md".to_string(),
                suggested_folder: "elsewhere".to_string(),
                folder_change_needed: false,
            },
            suggestion("Ghost.md", "anywhere"),
        ];
        let ledger = dir.path().join("reports").join(LEDGER_FILE);

        let report = MoveEngine::new()
            .move_from_suggestions(&vault, &suggestions, false, Some(&ledger))
            .await
            .unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.conflicts, 3);
        assert_eq!(report.moved, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.total_link_updates, 1);
        assert!(dir.path().join("one/Note.md").exists());
        assert!(dir.path().join("two/Note.md").exists());
        assert_eq!(read(dir.path(), "taken/Lonely.md"), "occupied");
        assert_eq!(read(dir.path(), "Hub.md"), "[[areas/Free]] [[one/Note]]");

        let written: LinkUpdateLedger =
            serde_json::from_str(&fs::read_to_string(&ledger).unwrap()).unwrap();
        assert!(!written.dry_run);
        assert_eq!(
            written.entries,
            vec![LedgerEntry {
                file: "Free.md".to_string(),
                target: "areas/Free.md".to_string(),
                link_updates: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_one_document_sent_to_two_folders_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Note.md", "note");
        write(dir.path(), "Ref.md", "[[Note]]");
        let vault = Vault::open(dir.path()).unwrap();

        let suggestions = vec![suggestion("Note.md", "x"), suggestion("Note.md", "y")];
        let report = MoveEngine::new()
            .move_from_suggestions(&vault, &suggestions, false, None)
            .await
            .unwrap();

        assert_eq!(report.conflicts, 2);
        assert_eq!(report.moved, 0);
        assert!(report.results.iter().all(|r| r.status == MoveStatus::Conflict
            && r.error.as_deref().unwrap().contains("renamed in different ways")));
        assert!(dir.path().join("Note.md").exists());
        assert!(!dir.path().join("x/Note.md").exists());
        assert!(!dir.path().join("y/Note.md").exists());
        assert_eq!(read(dir.path(), "Ref.md"), "[[Note]]");
    }

    #[test]
    fn test_plan_flags_two_names_renamed_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let records = vec![
            MoveRecord::new("a/Note.md", "c/Topic.md"),
            MoveRecord::new("b/Idea.md", "d/Topic.md"),
        ];

        let conflicts = plan_conflicts(&vault, &records);

        assert_eq!(conflicts.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert!(conflicts
            .values()
            .all(|reason| reason == "several references would be renamed to [[Topic]]"));
    }

    #[tokio::test]
    async fn test_move_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A.md", "a");
        let vault = Vault::open(dir.path()).unwrap();

        let result = MoveEngine::new()
            .move_document(&vault, "A.md", "../A.md", &vault.document_paths(), false)
            .await;

        assert!(matches!(result, Err(VaultError::OutsideRoot { .. })));
        assert!(dir.path().join("A.md").exists());
    }

    #[tokio::test]
    async fn test_sequential_moves_see_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A.md", "[[B]] [[C]]");
        write(dir.path(), "B.md", "[[C]]");
        write(dir.path(), "C.md", "c");
        let vault = Vault::open(dir.path()).unwrap();

        let report = MoveEngine::new()
            .move_from_suggestions(
                &vault,
                &[suggestion("B.md", "x"), suggestion("C.md", "y")],
                false,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.moved, 2);
        assert_eq!(report.total_link_updates, 3);
        assert_eq!(read(dir.path(), "A.md"), "[[x/B]] [[y/C]]");
        assert_eq!(read(dir.path(), "x/B.md"), "[[y/C]]");
        assert!(report.ledger.is_none());
    }
}
