//! Error types for the search backend adapter.

use thiserror::Error;

/// Errors surfaced by [`crate::SearchBackend`] implementations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// One or more operations in a bulk request failed. The whole bulk is
    /// treated as failed; the caller must not advance its watermark.
    #[error("bulk execution failed: {0}")]
    Bulk(String),

    /// Transport-level failure (connection refused, timeout, ...).
    #[error("search backend request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status from the backend.
    #[error("search backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape.
    #[error("malformed search backend response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}
