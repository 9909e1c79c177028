//! Error types for MirrorDom sessions.

use mirrordom_core::{ApplyError, MarkupError};
use mirrordom_store::StoreError;
use mirrordom_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while running a mirroring session.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Session protocol error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Relay storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Change log could not be applied.
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Markup could not be parsed.
    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),
}

impl MirrorError {
    /// Whether the session can no longer make progress and must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MirrorError::Sync(SyncError::Invariant(_)))
    }
}

/// Result type for MirrorDom operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
