use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logger::Logger;
use crate::vault::fsutil;

/// A per-file failure recorded in a batch result instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

impl FileFailure {
    pub fn new(path: impl Into<String>, error: impl ToString) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

/// Persist `value` as pretty JSON at `path`, creating parent directories.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fsutil::write_atomic(path, &json).await
}

/// Log a bounded sample of failures after a batch.
pub(crate) fn log_failures<'a, I>(logger: &Logger, failures: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let failures: Vec<_> = failures.into_iter().collect();
    if failures.is_empty() {
        return;
    }
    logger.warn(&format!("{} file(s) failed", failures.len()));
    for (path, error) in failures.iter().take(super::FAILURE_LOG_SAMPLE) {
        logger.warn(&format!("  {}: {}", path, error));
    }
    if failures.len() > super::FAILURE_LOG_SAMPLE {
        logger.warn(&format!(
            "  ... and {} more",
            failures.len() - super::FAILURE_LOG_SAMPLE
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_json_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/failures.json");
        let failures = vec![FileFailure::new("a.md", "boom")];

        write_json(&path, &failures).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"));
        let back: Vec<FileFailure> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, failures);
    }
}
