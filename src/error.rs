//! Error types for memory palace operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PalaceError>;

#[derive(Debug, Error)]
pub enum PalaceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: memory {0}")]
    NotFound(i64),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("model server error: {0}")]
    ModelServer(String),

    #[error("model server error (fatal): {0}")]
    ModelServerFatal(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PalaceError {
    /// Whether retrying the same operation might succeed. Used by the
    /// model-server client's retry loop; never true for validation/conflict
    /// classes which won't change on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PalaceError::ModelServer(_) | PalaceError::Http(_))
    }

    pub fn code(&self) -> i32 {
        match self {
            PalaceError::Validation(_) => -32001,
            PalaceError::NotFound(_) => -32002,
            PalaceError::Conflict(_) => -32003,
            PalaceError::ModelServer(_) => -32004,
            PalaceError::ModelServerFatal(_) => -32005,
            PalaceError::Database(_) => -32006,
            PalaceError::Http(_) => -32007,
            PalaceError::Serialization(_) => -32008,
            PalaceError::Io(_) => -32009,
            PalaceError::Config(_) => -32010,
            PalaceError::Internal(_) => -32099,
        }
    }
}
