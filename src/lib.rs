pub mod config;
pub mod error;
pub mod logger;
pub mod reorg;
pub mod vault;

pub use crate::config::Settings;
pub use crate::error::{Result, VaultError};
pub use crate::vault::Vault;
