//! Error taxonomy for the retrieval core.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RetrievalErr>;

/// Errors surfaced by the retrieval core.
///
/// Variants map onto the error taxonomy: input errors are surfaced to the
/// caller synchronously, parse/index errors are recorded in the manifest,
/// transient I/O errors are logged and dropped, and `Fatal` is reported to
/// the orchestrator to decide whether to discard and rebuild.
#[derive(Debug, Error)]
pub enum RetrievalErr {
    #[error("empty query")]
    EmptyQuery,

    #[error("invalid path: {path:?}: {cause}")]
    InvalidPath { path: PathBuf, cause: String },

    #[error("invalid config field '{field}': {cause}")]
    ConfigError { field: String, cause: String },

    #[error("failed to parse config file {path:?}: {cause}")]
    ConfigParseError { path: PathBuf, cause: String },

    #[error("parser failed on {path:?}: {cause}")]
    ParseError { path: PathBuf, cause: String },

    #[error("index write failed for {path:?}: {cause}")]
    IndexError { path: PathBuf, cause: String },

    #[error("transient I/O error on {path:?}: {cause}")]
    TransientIoError { path: PathBuf, cause: String },

    #[error("retrieval failed: {cause}")]
    RetrievalFailed { cause: String },

    #[error("manifest corrupt at {path:?}: {cause}")]
    ManifestCorrupt { path: PathBuf, cause: String },

    #[error("vector store error: {cause}")]
    StoreError { cause: String },

    #[error("embedding error: {cause}")]
    EmbeddingError { cause: String },

    #[error("unknown task id: {0}")]
    UnknownTask(String),

    #[error("benchmark job not found: {0}")]
    JobNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RetrievalErr {
    pub fn invalid_path(path: impl Into<PathBuf>, cause: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            cause: cause.into(),
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::ParseError {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn index_error(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::IndexError {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn transient_io(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::TransientIoError {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}
