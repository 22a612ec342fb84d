//! Error types for StampKV
//!
//! Provides a unified error type for all operations.
//!
//! A failed version check is *not* an error: it is reported through
//! [`CommitOutcome::CheckFailed`](crate::write::CommitOutcome) so callers can
//! re-read and retry.

use thiserror::Error;

use crate::value::ValueEncoding;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for StampKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Request Errors (detected before storage is touched)
    // -------------------------------------------------------------------------
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Mutation Errors
    // -------------------------------------------------------------------------
    #[error("Type mismatch on key {key}: numeric mutation on {found:?} value")]
    TypeMismatch { key: String, found: ValueEncoding },

    // -------------------------------------------------------------------------
    // Decoding Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Whether this error came from the underlying table rather than the request.
    ///
    /// Storage faults abort the in-flight transaction; the whole operation may
    /// be retried.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            KvError::Storage(_) | KvError::Conflict(_) | KvError::Io(_) | KvError::WalCorruption(_)
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        KvError::Validation(message.into())
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        KvError::Decode(message.into())
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
