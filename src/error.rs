use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading inputs or fetching external data
#[derive(Debug, Error)]
pub enum DataError {
    /// A required file or table is absent; fatal for the whole run
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Every delimiter/encoding candidate failed, or required columns are absent
    #[error("malformed input {path}: {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    /// External fetch failed or timed out; recovered per entity
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("background load failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl DataError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DataError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type DataResult<T> = std::result::Result<T, DataError>;
