use std::path::PathBuf;

/// Error types for vault reorganization operations
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Document not found: {path}")]
    NotFound { path: String },

    #[error("Malformed metadata block in {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conflicting operations on {target}: {reason}")]
    Conflict { target: String, reason: String },

    #[error("Path leaves the vault root: {path}")]
    OutsideRoot { path: String },

    #[error("Invalid vault root: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("Backup manifest error: {0}")]
    Manifest(String),

    #[error("Input artifact {}: {reason}", .path.display())]
    InputArtifact { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to emit metadata block: {0}")]
    Emit(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl VaultError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ParseFailure { .. } => "parse_failure",
            Self::Io { .. } => "io_failure",
            Self::Conflict { .. } => "conflict",
            Self::OutsideRoot { .. } => "outside_root",
            Self::InvalidRoot(_) => "invalid_root",
            Self::Manifest(_) => "manifest",
            Self::InputArtifact { .. } => "input_artifact",
            Self::Serialization(_) => "serialization",
            Self::Emit(_) => "emit",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = VaultError::NotFound {
            path: "a.md".to_string(),
        };
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), "Document not found: a.md");

        let err = VaultError::io(
            "x/y.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), "io_failure");
        assert!(err.to_string().contains("x/y.md"));
    }
}
