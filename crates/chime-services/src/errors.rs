//! Collaborator error type.

use thiserror::Error;

/// Errors produced by collaborator clients.
///
/// The pipeline treats every variant the same way at a stage boundary:
/// substitute the fallback if one exists, abort the run otherwise.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network-level failure reaching the collaborator.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The collaborator answered with a non-success status.
    #[error("upstream returned {status}: {detail}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt or reason phrase.
        detail: String,
    },

    /// The collaborator answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A referenced resource does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local database failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The client is missing configuration it needs to operate.
    #[error("not configured: {0}")]
    NotConfigured(String),
}
