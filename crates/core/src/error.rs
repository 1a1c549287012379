use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid at uri: {0}")]
    InvalidAtUri(String),
}

/// Failure reported by a thread source, comment adapter or store.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
