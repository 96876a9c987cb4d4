use std::fs;
use std::path::Path;

use vault_reorg::config::Settings;
use vault_reorg::reorg::audit::LossStatus;
use vault_reorg::reorg::mover::{LinkUpdateLedger, LEDGER_FILE};
use vault_reorg::reorg::suggestions::{load_records, NoteEntry};
use vault_reorg::reorg::tags::TagStatus;
use vault_reorg::reorg::validator::ValidationStatus;
use vault_reorg::reorg::{
    BackupManager, Classifier, FolderSuggestion, LossAuditor, MoveEngine, MoveStatus,
    RollbackManager, TagMerger, TagSuggestion, Validator,
};
use vault_reorg::{Vault, VaultError};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn snapshot(root: &Path, vault: &Vault) -> Vec<(String, Vec<u8>)> {
    vault
        .document_paths()
        .into_iter()
        .map(|rel| {
            let bytes = fs::read(root.join(&rel)).unwrap();
            (rel, bytes)
        })
        .collect()
}

#[tokio::test]
async fn test_move_scenario_rewrites_plain_and_aliased_references() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "A.md", "See [[B]] and [[B|Beta]].");
    write(dir.path(), "B.md", "# B\n");
    let vault = Vault::open(dir.path()).unwrap();

    let result = MoveEngine::new()
        .move_document(&vault, "B.md", "folder/B.md", &vault.document_paths(), false)
        .await
        .unwrap();

    assert_eq!(result.status, MoveStatus::Moved);
    assert_eq!(result.other_files_link_updates, 2);
    assert_eq!(read(dir.path(), "A.md"), "See [[folder/B]] and [[folder/B|Beta]].");
    assert_eq!(read(dir.path(), "folder/B.md"), "# B\n");
}

#[tokio::test]
async fn test_move_and_back_restores_every_reference() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Index.md",
        "- [[projects/Plan]]\n- [[Plan|the plan]]\n- [[Plan#Goals]]\n- ![[Plan]]\n",
    );
    write(dir.path(), "projects/Plan.md", "---\ntags: [plan]\n---\nSee [[Index]].\n");
    write(dir.path(), "Other.md", "Unrelated [[Index]] text.\n");
    let vault = Vault::open(dir.path()).unwrap();
    let before = snapshot(dir.path(), &vault);
    let engine = MoveEngine::new();

    let there = engine
        .move_document(
            &vault,
            "projects/Plan.md",
            "archive/2024/Strategy.md",
            &vault.document_paths(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(there.other_files_link_updates, 4);
    assert_eq!(
        read(dir.path(), "Index.md"),
        "- [[archive/2024/Strategy]]\n- [[Strategy|the plan]]\n- [[Strategy#Goals]]\n- ![[Strategy]]\n"
    );

    engine
        .move_document(
            &vault,
            "archive/2024/Strategy.md",
            "projects/Plan.md",
            &vault.document_paths(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(snapshot(dir.path(), &vault), before);
}

#[tokio::test]
async fn test_dry_run_move_batch_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "A.md", "[[B]] [[C]]");
    write(dir.path(), "B.md", "b");
    write(dir.path(), "C.md", "c");
    let vault = Vault::open(dir.path()).unwrap();
    let before = snapshot(dir.path(), &vault);
    let ledger = dir.path().join("out").join(LEDGER_FILE);

    let suggestions = vec![
        FolderSuggestion {
            file: "B.md".to_string(),
            suggested_folder: "x".to_string(),
            folder_change_needed: true,
        },
        FolderSuggestion {
            file: "C.md".to_string(),
            suggested_folder: "y".to_string(),
            folder_change_needed: true,
        },
    ];

    let report = MoveEngine::new()
        .move_from_suggestions(&vault, &suggestions, true, Some(&ledger))
        .await
        .unwrap();

    assert_eq!(report.would_move, 2);
    assert_eq!(report.total_link_updates, 2);
    assert_eq!(snapshot(dir.path(), &vault), before);

    let written: LinkUpdateLedger = serde_json::from_str(&fs::read_to_string(&ledger).unwrap()).unwrap();
    assert!(written.dry_run);
    assert_eq!(written.entries.len(), 2);
}

#[tokio::test]
async fn test_backup_then_restore_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "---\ntags: [x]\n---\nbody with trailing spaces   \n");
    write(dir.path(), "deep/nested/b.md", "ünïcode\r\nline\n");
    write(dir.path(), "c.md", "");
    let vault = Vault::open(dir.path()).unwrap();
    let before = snapshot(dir.path(), &vault);

    let manifest = BackupManager::new()
        .create_backup(&vault, backups.path())
        .await
        .unwrap();

    let suggestions = vec![TagSuggestion {
        file: "a.md".to_string(),
        suggested_tags: vec!["y".to_string()],
        suggested_backlink: Some("Hub".to_string()),
    }];
    TagMerger::new(Default::default())
        .apply_suggestions(&vault, &suggestions, false)
        .await;
    write(dir.path(), "deep/nested/b.md", "clobbered");
    assert_ne!(snapshot(dir.path(), &vault), before);

    let result = RollbackManager::new()
        .rollback(&manifest.backup_root, dir.path(), false)
        .await
        .unwrap();

    assert_eq!(result.restored_files, 3);
    assert_eq!(snapshot(dir.path(), &vault), before);
}

#[tokio::test]
async fn test_rollback_reports_missing_backup_copies() {
    let dir = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    for i in 0..100 {
        write(dir.path(), &format!("notes/n{:03}.md", i), &format!("note {}\n", i));
    }
    let vault = Vault::open(dir.path()).unwrap();

    let manifest = BackupManager::new()
        .create_backup(&vault, backups.path())
        .await
        .unwrap();
    assert_eq!(manifest.total_files, 100);

    for i in [3, 50, 97] {
        fs::remove_file(manifest.backup_root.join(format!("notes/n{:03}.md", i))).unwrap();
    }

    let result = RollbackManager::new()
        .restore_from_backup(&manifest, dir.path(), false)
        .await
        .unwrap();

    assert_eq!(result.restored_files, 97);
    assert_eq!(result.failed_files, 3);
    assert!(result
        .failures
        .iter()
        .all(|f| f.error == "Backup file does not exist"));
    assert_eq!(result.failures[1].path, "notes/n050.md");
}

#[tokio::test]
async fn test_backup_inside_vault_survives_moves() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "A.md", "See [[B]].\n");
    write(dir.path(), "B.md", "# B\n");
    let vault = Vault::open(dir.path()).unwrap();

    let manifest = BackupManager::new()
        .create_backup(&vault, &dir.path().join("_backups"))
        .await
        .unwrap();
    assert_eq!(vault.document_paths(), vec!["A.md", "B.md"]);

    let suggestions = vec![FolderSuggestion {
        file: "B.md".to_string(),
        suggested_folder: "folder".to_string(),
        folder_change_needed: true,
    }];
    let report = MoveEngine::new()
        .move_from_suggestions(&vault, &suggestions, false, None)
        .await
        .unwrap();

    assert_eq!(report.moved, 1);
    assert_eq!(report.total_link_updates, 1);
    let updated: Vec<&str> = report.results[0]
        .updated_files
        .iter()
        .map(|u| u.file.as_str())
        .collect();
    assert_eq!(updated, vec!["A.md"]);
    assert_eq!(read(dir.path(), "A.md"), "See [[folder/B]].\n");
    assert_eq!(read(&manifest.backup_root, "A.md"), "See [[B]].\n");

    let result = RollbackManager::new()
        .restore_from_backup(&manifest, dir.path(), false)
        .await
        .unwrap();

    assert_eq!(result.failed_files, 0);
    assert_eq!(result.restored_files, 2);
    assert_eq!(read(dir.path(), "A.md"), "See [[B]].\n");
}

#[tokio::test]
async fn test_invalid_root_is_fatal() {
    let result = Vault::open("/no/such/vault/root");
    assert!(matches!(result, Err(VaultError::InvalidRoot(_))));
}

#[tokio::test]
async fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "Health MoC.md",
        "---\ncreated: 2024-01-01\ntags: [MoC]\n---\n## Links\n- [[Sleep]]\n- [[Diet]]\n\n## Notes\n",
    );
    write(
        root,
        "Sleep.md",
        "---\ncreated: 2024-01-02\ntags: [health]\n---\n### Main Idea\nRest matters, see [[Diet]].\n### Notes\n",
    );
    write(
        root,
        "Diet.md",
        "---\ncreated: 2024-01-03\n---\n### Main Idea\nFood.\n### Notes\n",
    );
    let settings = Settings::default();
    let vault = Vault::open(root).unwrap();

    // Backup
    let manifest = BackupManager::new()
        .create_backup(&vault, backups.path())
        .await
        .unwrap();
    assert_eq!(manifest.total_files, 3);

    // Classify
    let classification = Classifier::new(settings.classifier.clone())
        .classify_vault(&vault, reports.path())
        .await
        .unwrap();
    assert_eq!(classification.index_documents.len(), 1);
    assert_eq!(classification.regular_documents.len(), 2);

    // Tags: dry run first, then execute
    let suggestions = vec![
        TagSuggestion {
            file: "Sleep.md".to_string(),
            suggested_tags: vec!["Health".to_string(), "rest".to_string()],
            suggested_backlink: Some("Health MoC".to_string()),
        },
        TagSuggestion {
            file: "Diet.md".to_string(),
            suggested_tags: vec!["food".to_string()],
            suggested_backlink: Some("Health MoC".to_string()),
        },
    ];
    let merger = TagMerger::new(settings.tags.clone());
    let dry = merger.apply_suggestions(&vault, &suggestions, true).await;
    assert_eq!(dry.would_update, 2);
    assert_eq!(read(root, "Diet.md"), "---\ncreated: 2024-01-03\n---\n### Main Idea\nFood.\n### Notes\n");

    let applied = merger.apply_suggestions(&vault, &suggestions, false).await;
    assert_eq!(applied.updated, 2);
    assert!(applied.results.iter().all(|r| r.status == TagStatus::Updated));
    assert_eq!(applied.results[0].final_tags, vec!["health", "rest"]);

    // Audit single-file backups left by tag application
    let audit = LossAuditor::new(settings.audit.clone())
        .audit_sibling_backups(&vault, &settings.tags.backup_suffix, reports.path())
        .await
        .unwrap();
    assert_eq!(audit.data_loss_count, 0);
    assert!(audit
        .entries
        .iter()
        .any(|e| e.file == "Sleep.md" && e.status == LossStatus::Different));

    // Move
    let moves = vec![FolderSuggestion {
        file: "Diet.md".to_string(),
        suggested_folder: "Health".to_string(),
        folder_change_needed: true,
    }];
    let moved = MoveEngine::new()
        .move_from_suggestions(&vault, &moves, false, Some(&reports.path().join(LEDGER_FILE)))
        .await
        .unwrap();
    assert_eq!(moved.moved, 1);
    assert_eq!(moved.total_link_updates, 2);
    assert!(read(root, "Sleep.md").contains("see [[Health/Diet]]."));

    // Validate the persisted lists
    let validator = Validator::new(settings.validation.clone());
    let index_list = load_records::<NoteEntry>(&reports.path().join("index_documents.json"))
        .await
        .unwrap();
    let index_report = validator
        .validate_notes(&vault, &index_list.records, true)
        .await;
    assert_eq!(index_report.valid, 1, "{:?}", index_report.results);

    let regular = vec![
        NoteEntry {
            file: "Sleep.md".to_string(),
            is_moc: Some(false),
        },
        NoteEntry {
            file: "Health/Diet.md".to_string(),
            is_moc: Some(false),
        },
    ];
    let regular_report = validator.validate_notes(&vault, &regular, false).await;
    assert_eq!(regular_report.valid, 2, "{:?}", regular_report.results);

    // Roll the content back
    let rollback = RollbackManager::new()
        .rollback(&manifest.backup_root, root, false)
        .await
        .unwrap();
    assert_eq!(rollback.restored_files, 3);
    assert_eq!(
        read(root, "Diet.md"),
        "---\ncreated: 2024-01-03\n---\n### Main Idea\nFood.\n### Notes\n"
    );
}

#[tokio::test]
async fn test_validation_of_index_missing_notes() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Hub.md",
        "---\ncreated: 2024-01-01\ntags: [MoC]\n---\n## Links\n",
    );
    let vault = Vault::open(dir.path()).unwrap();

    let result = Validator::new(Default::default())
        .validate(&vault, "Hub.md", true)
        .await;

    assert_eq!(result.status, ValidationStatus::Issues);
    assert_eq!(result.issues.metadata_structure.len(), 1);
    assert_eq!(result.total_issues, 1);
}
