//! Error types surfaced by the pipeline's public operations

use thiserror::Error;

/// Errors returned by store and read-model operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("metrics store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("report window must be positive, got {hours} hours")]
    InvalidWindow { hours: i64 },

    #[error("unsupported export format '{0}'")]
    UnsupportedFormat(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metrics store lock poisoned")]
    LockPoisoned,

    #[error("blocking store task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
