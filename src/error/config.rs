//! Configuration loading errors.

use std::path::PathBuf;

use thiserror::Error;

use super::category::ErrorCategory;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "E_CFG_NOT_FOUND",
            ConfigError::Read { .. } => "E_CFG_READ",
            ConfigError::Parse { .. } => "E_CFG_PARSE",
            ConfigError::Invalid { .. } => "E_CFG_INVALID",
        }
    }
}
