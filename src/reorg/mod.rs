//! The reorganization pipeline: backup, classify, tag, move, validate, audit and roll back.

pub mod artifact;
pub mod audit;
pub mod backup;
pub mod classifier;
pub mod mover;
pub mod progress;
pub mod rollback;
pub mod suggestions;
pub mod tags;
pub mod validator;

pub use artifact::FileFailure;
pub use audit::{LossAuditor, LossFinding, LossReport};
pub use backup::{BackupManager, Manifest};
pub use classifier::{Classification, ClassifyReason, Classifier};
pub use mover::{MoveEngine, MoveResult, MoveStatus};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use rollback::{RestoreResult, RollbackManager};
pub use suggestions::{FolderSuggestion, LossCandidate, NoteEntry, TagSuggestion};
pub use tags::{merge_backlink, merge_tags, tags_changed, TagApplyResult, TagMerger};
pub use validator::{ValidationResult, Validator};

/// Number of per-document failures echoed to the log after a batch.
pub(crate) const FAILURE_LOG_SAMPLE: usize = 10;
