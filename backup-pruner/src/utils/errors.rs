//! Custom error types for the backup pruner.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrunerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No manifest (*meta.json) found in {}", folder.display())]
    ManifestMissing { folder: PathBuf },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No backup files found in {}", folder.display())]
    NoBackupsFound { folder: PathBuf },

    #[error("File system error on {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrunerError {
    /// Wrap an I/O error with the path it happened on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrunerError::FileSystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrunerError>;
