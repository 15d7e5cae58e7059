//! Error types for configuration resolution and credential persistence.

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The resolved location does not contain the configuration file.
    #[error("Unable to locate configuration file at {}", path.display())]
    ConfigurationNotFound { path: PathBuf },

    /// The directory heuristic needs more ancestors than the base directory has.
    #[error(
        "Cannot walk {levels} directory level(s) up from {} while searching for the configuration file",
        base_dir.display()
    )]
    SearchRootUnavailable { base_dir: PathBuf, levels: usize },

    #[error("Unable to determine the executable's base directory: {0}")]
    BaseDirectoryUnavailable(#[source] std::io::Error),

    /// The file exists but could not be read or parsed.
    #[error("Failed to load configuration file {}: {source:#}", path.display())]
    ConfigurationLoadError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Writing the in-memory document back to disk failed. The document keeps
    /// the unsaved values so the save can be retried.
    #[error("Failed to save configuration file {}: {source:#}", path.display())]
    PersistenceError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Stored expiration '{value}' is not a valid round-trip timestamp")]
    InvalidExpiration {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Token lifetime of {expires_in} seconds does not produce a representable expiration")]
    ExpirationOutOfRange { expires_in: i64 },

    #[error("Expiration {instant} is outside the storable years 0000-9999")]
    UnstorableExpiration { instant: String },
}

impl ConfigError {
    /// Path the error refers to, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            ConfigError::ConfigurationNotFound { path }
            | ConfigError::ConfigurationLoadError { path, .. }
            | ConfigError::PersistenceError { path, .. } => Some(path),
            ConfigError::SearchRootUnavailable { base_dir, .. } => Some(base_dir),
            _ => None,
        }
    }
}
