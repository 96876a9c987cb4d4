use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use vault_reorg::config::Settings;
use vault_reorg::logger;
use vault_reorg::reorg::artifact::write_json;
use vault_reorg::reorg::mover::LEDGER_FILE;
use vault_reorg::reorg::suggestions::{
    load_records, FolderSuggestion, LoadedRecords, LossCandidate, NoteEntry, TagSuggestion,
};
use vault_reorg::reorg::{
    BackupManager, Classifier, LogProgress, LossAuditor, Manifest, MoveEngine, ProgressSink,
    RollbackManager, TagMerger, Validator,
};
use vault_reorg::Vault;

#[derive(Parser)]
#[command(name = "vault-reorg")]
#[command(about = "Reorganize an Obsidian vault without losing links or content")]
struct Cli {
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    #[arg(short, long)]
    vault_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Snapshot every document into a timestamped backup folder
    Backup {
        #[arg(long)]
        backup_dir: Option<PathBuf>,
    },
    /// Split documents into index and regular lists
    Classify,
    /// Merge suggested tags and backlinks into metadata
    Tags {
        #[arg(long)]
        suggestions: PathBuf,
        #[arg(long)]
        execute: bool,
    },
    /// Move documents into suggested folders, rewriting references
    Move {
        #[arg(long)]
        suggestions: PathBuf,
        #[arg(long)]
        execute: bool,
    },
    /// Check structure, tags and references of listed documents
    Validate {
        #[arg(long)]
        notes: PathBuf,
        /// Treat entries without `is_moc` as index documents
        #[arg(long)]
        index: bool,
    },
    /// Compare documents with a snapshot, or with their single-file backups
    Audit {
        #[arg(long)]
        backup: Option<PathBuf>,
    },
    /// Restore a snapshot over the vault
    Rollback {
        #[arg(long)]
        backup: PathBuf,
        #[arg(long)]
        execute: bool,
    },
    /// Restore flagged documents from their single-file backups
    Restore {
        #[arg(long)]
        candidates: PathBuf,
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    if let Some(path) = cli.vault_path {
        settings.vault.path = path;
    }

    logger::init(&settings.logging)?;

    info!("Starting vault-reorg v{}", env!("CARGO_PKG_VERSION"));
    info!("Vault: {}", settings.vault.path.display());

    let vault = Vault::from_config(&settings.vault)?;
    let progress: Arc<dyn ProgressSink> = Arc::new(LogProgress::new(settings.progress.every));
    let output_dir = settings.vault.output_dir.clone();

    match cli.command {
        Command::Backup { backup_dir } => {
            let backup_dir = backup_dir.unwrap_or_else(|| settings.vault.backup_dir.clone());
            let manifest = BackupManager::new()
                .with_progress(progress)
                .create_backup(&vault, &backup_dir)
                .await?;
            println!("{}", manifest.backup_root.display());
        }
        Command::Classify => {
            Classifier::new(settings.classifier.clone())
                .with_tag_field(&settings.tags.field)
                .with_progress(progress)
                .classify_vault(&vault, &output_dir)
                .await?;
        }
        Command::Tags {
            suggestions,
            execute,
        } => {
            let records: Vec<TagSuggestion> = load_input(&suggestions).await?;
            let report = TagMerger::new(settings.tags.clone())
                .with_progress(progress)
                .apply_suggestions(&vault, &records, !execute)
                .await;
            let name = if execute {
                "tag_application_results.json"
            } else {
                "tag_application_dry_run.json"
            };
            write_json(&output_dir.join(name), &report).await?;
        }
        Command::Move {
            suggestions,
            execute,
        } => {
            let records: Vec<FolderSuggestion> = load_input(&suggestions).await?;
            let report = MoveEngine::new()
                .with_progress(progress)
                .move_from_suggestions(
                    &vault,
                    &records,
                    !execute,
                    Some(&output_dir.join(LEDGER_FILE)),
                )
                .await?;
            let name = if execute {
                "move_results.json"
            } else {
                "move_dry_run.json"
            };
            write_json(&output_dir.join(name), &report).await?;
        }
        Command::Validate { notes, index } => {
            let entries: Vec<NoteEntry> = load_input(&notes).await?;
            let report = Validator::new(settings.validation.clone())
                .with_tag_field(&settings.tags.field)
                .with_index_marker(&settings.classifier.index_marker)
                .with_progress(progress)
                .validate_notes(&vault, &entries, index)
                .await;
            write_json(&output_dir.join("validation_report.json"), &report).await?;
        }
        Command::Audit { backup } => {
            let auditor = LossAuditor::new(settings.audit.clone()).with_progress(progress);
            let report = match backup {
                Some(backup_path) => {
                    let manifest = Manifest::load(&backup_path).await?;
                    auditor.audit_backup(&vault, &manifest, &output_dir).await?
                }
                None => {
                    auditor
                        .audit_sibling_backups(&vault, &settings.tags.backup_suffix, &output_dir)
                        .await?
                }
            };
            if report.data_loss_count > 0 {
                warn!(
                    "{} documents need review before the backups are discarded",
                    report.data_loss_count
                );
            }
        }
        Command::Rollback { backup, execute } => {
            let result = RollbackManager::new()
                .with_progress(progress)
                .rollback(&backup, vault.root(), !execute)
                .await?;
            write_json(&output_dir.join("rollback_results.json"), &result).await?;
        }
        Command::Restore {
            candidates,
            execute,
        } => {
            let records: Vec<LossCandidate> = load_input(&candidates).await?;
            let report = RollbackManager::new()
                .with_backup_suffix(&settings.tags.backup_suffix)
                .with_progress(progress)
                .restore_candidates(&vault, &records, !execute)
                .await;
            write_json(&output_dir.join("restore_results.json"), &report).await?;
        }
    }

    Ok(())
}

async fn load_input<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let LoadedRecords { records, rejected } = load_records(path).await?;
    for entry in rejected.iter().take(10) {
        warn!(
            "Rejected entry {} in {}: {}",
            entry.index,
            path.display(),
            entry.error
        );
    }
    if rejected.len() > 10 {
        warn!("... and {} more rejected entries", rejected.len() - 10);
    }
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
