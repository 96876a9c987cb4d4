use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Proposed tags and backlink for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSuggestion {
    pub file: String,
    #[serde(default)]
    pub suggested_tags: Vec<String>,
    #[serde(default)]
    pub suggested_backlink: Option<String>,
}

/// Proposed destination folder for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSuggestion {
    pub file: String,
    pub suggested_folder: String,
    #[serde(default)]
    pub folder_change_needed: bool,
}

/// A document to validate, optionally pre-classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    pub file: String,
    #[serde(default)]
    pub is_moc: Option<bool>,
}

/// A document flagged for restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossCandidate {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LoadedRecords<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RejectedEntry>,
}

/// Parse a JSON array of records; entries that do not fit `T` are rejected one by one.
pub fn parse_records<T: DeserializeOwned>(json: &str, path: &Path) -> Result<LoadedRecords<T>> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| VaultError::InputArtifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(VaultError::InputArtifact {
                path: path.to_path_buf(),
                reason: format!("expected a JSON array, found {}", json_kind(&other)),
            })
        }
    };

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(RejectedEntry {
                index,
                error: e.to_string(),
            }),
        }
    }

    Ok(LoadedRecords { records, rejected })
}

pub async fn load_records<T: DeserializeOwned>(path: &Path) -> Result<LoadedRecords<T>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| VaultError::InputArtifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    parse_records(&json, path)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
