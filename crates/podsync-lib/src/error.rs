//! Error types for the sync layer

use thiserror::Error;

/// Errors surfaced to callers of the sync layer
///
/// Stale events and buffer overflow are not errors; they are absorbed
/// silently by the reconciler.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("backend call failed: {0}")]
    Backend(String),

    #[error("event subscription failed: {0}")]
    Subscribe(String),

    #[error("sync task is not running")]
    Closed,

    #[error("malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
