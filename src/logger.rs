use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Component-scoped logger; every message is prefixed with the component name.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn info(&self, message: &str) {
        info!("[{}] {}", self.name, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.name, message);
    }

    pub fn error(&self, message: &str) {
        error!("[{}] {}", self.name, message);
    }

    pub fn debug(&self, message: &str) {
        debug!("[{}] {}", self.name, message);
    }
}

pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match (&config.file, config.json) {
        (Some(path), json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path.display(), e))?;
            let writer = Arc::new(file);
            if json {
                tracing::subscriber::set_global_default(
                    registry.with(fmt::layer().json().with_writer(writer)),
                )
            } else {
                tracing::subscriber::set_global_default(
                    registry.with(fmt::layer().with_ansi(false).with_writer(writer)),
                )
            }
        }
        (None, true) => tracing::subscriber::set_global_default(registry.with(fmt::layer().json())),
        (None, false) => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
