//! Error taxonomy for the memory engine.
//!
//! Library code returns [`MemoryError`]; the binary and transport glue wrap it
//! in `anyhow` with context.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`MemoryError`].
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    /// Caller input rejected: empty text, confidence out of range, unknown enum value.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent write won the race on the live-fact uniqueness index.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// HTTP status code equivalent, used by the transport layer.
    pub fn http_status(&self) -> u16 {
        match self {
            MemoryError::Validation(_) => 422,
            MemoryError::NotFound(_) => 404,
            MemoryError::Conflict(_) => 409,
            MemoryError::Storage(_) | MemoryError::Timeout(_) | MemoryError::Internal(_) => 500,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MemoryError::Conflict(_))
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                MemoryError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => MemoryError::Storage(err),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Internal(format!("serialization: {err}"))
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::Internal(format!("blocking task failed: {err}"))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MemoryError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        MemoryError::Internal("database lock poisoned".into())
    }
}
