pub mod settings;

pub use settings::{
    AuditConfig, ClassifierConfig, LoggingConfig, ProgressConfig, Settings, TagConfig,
    ValidationConfig, VaultConfig,
};
