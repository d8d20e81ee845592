use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AidstatsError {
    #[error("Cache key error: {0}")]
    KeyConstruction(String),

    #[error("Timed out after {waited_secs}s waiting for bulk lock on '{dataset}'")]
    LockTimeout { dataset: String, waited_secs: u64 },

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("Cache clear incomplete: {0}")]
    ClearIncomplete(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AidstatsError {
    pub(crate) fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        AidstatsError::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AidstatsError>;
