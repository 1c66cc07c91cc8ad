//! Error types for the fingerprint-and-match engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fingerprint encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index temporarily unavailable: {0}")]
    IndexTransient(String),

    #[error("index unavailable: {0}")]
    IndexFatal(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl CoreError {
    /// Whether the driver should retry this error with backoff rather
    /// than immediately flagging the recording.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::IndexTransient(_))
    }

    /// Whether the driver should stop the whole worker rather than
    /// continue with the next recording.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::IndexFatal(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
