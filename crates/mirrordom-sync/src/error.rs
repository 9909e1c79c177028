//! Error types for the sync module.

use thiserror::Error;

use mirrordom_core::ApplyError;
use mirrordom_store::ErrorCode;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error. The round's payload is lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] mirrordom_store::StoreError),

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The relay rejected a request.
    #[error("server error ({code:?}): {message}")]
    Server { code: ErrorCode, message: String },

    /// A change log could not be applied.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// Internal state no longer matches the document it describes.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidMessage(err.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
