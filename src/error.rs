//! Error types for memories-sync.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or remote service failure. Recovered by the local fallback path.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The call would break a gallery invariant or lacks a required identity.
    /// Never retried.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A batch succeeded for a subset only.
    #[error("partial failure: {completed} completed, {failed} failed")]
    PartialFailure { completed: usize, failed: usize },

    /// No local collection and no usable seed dataset. Unrecoverable.
    #[error("seed dataset unavailable: {0}")]
    SeedUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying later may succeed. Reported with every sync
    /// discrepancy; the local fallback applies either way.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteUnavailable(_))
    }

    /// Short label for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RemoteUnavailable(_) => "remote_unavailable",
            Error::NotFound(_) => "not_found",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::PartialFailure { .. } => "partial_failure",
            Error::SeedUnavailable(_) => "seed_unavailable",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
