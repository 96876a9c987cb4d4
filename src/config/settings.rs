use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub vault: VaultConfig,
    pub classifier: ClassifierConfig,
    pub tags: TagConfig,
    pub validation: ValidationConfig,
    pub audit: AuditConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub path: PathBuf,
    /// Indexable document extension, without the dot.
    pub extension: String,
    pub backup_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ignore: Vec<String>,
}

/// Structural signals that mark a document as an index ("MoC") document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub index_marker: String,
    pub type_field: String,
    pub link_threshold: usize,
    pub section_level: u8,
    pub section_titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub field: String,
    pub backlink_field: String,
    pub backup_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub created_field: String,
    pub index_sections: Vec<String>,
    pub index_section_level: u8,
    pub regular_sections: Vec<String>,
    pub regular_section_level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Unexpected removed lines this short (in characters) are formatting noise.
    pub min_significant_len: usize,
    pub sample_limit: usize,
    pub expected_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub every: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./vault"),
            extension: "md".to_string(),
            backup_dir: PathBuf::from("./backups"),
            output_dir: PathBuf::from("./reports"),
            ignore: vec![
                ".git".to_string(),
                ".obsidian".to_string(),
                ".trash".to_string(),
                "node_modules".to_string(),
            ],
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            index_marker: "MoC".to_string(),
            type_field: "ContentType".to_string(),
            link_threshold: 5,
            section_level: 2,
            section_titles: vec![
                "Links".to_string(),
                "Related MoCs".to_string(),
                "External Resources".to_string(),
            ],
        }
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            field: "tags".to_string(),
            backlink_field: "Backlink".to_string(),
            backup_suffix: ".backup".to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            created_field: "created".to_string(),
            index_sections: vec!["Links".to_string(), "Notes".to_string()],
            index_section_level: 2,
            regular_sections: vec!["Main Idea".to_string(), "Notes".to_string()],
            regular_section_level: 3,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            min_significant_len: 15,
            sample_limit: 5,
            expected_tags: [
                "ai", "meeting", "question", "reference", "idea", "main", "tech", "obsidian",
                "moc",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { every: 100 }
    }
}

impl Settings {
    /// Layer the optional config file and `VAULT_REORG__*` environment variables over
    /// the defaults.
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VAULT_REORG").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
