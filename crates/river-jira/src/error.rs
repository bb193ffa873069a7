//! Error types for the upstream client.

use thiserror::Error;

/// Errors surfaced by [`crate::JiraClient`] implementations.
///
/// Both kinds fail the current indexing run; the distinction only drives
/// logging and operator guidance. Transient failures resolve themselves on
/// the next coordinator tick, fatal ones (auth, malformed data) need an
/// operator.
#[derive(Debug, Error)]
pub enum JiraClientError {
    /// Timeout, connection failure or a 5xx from the upstream.
    #[error("jira request failed: {0}")]
    Transient(String),

    /// The upstream rejected the request; includes 401/403 auth failures.
    #[error("jira rejected the request (HTTP {status}): {body}")]
    Fatal { status: u16, body: String },

    /// Response body did not have the expected shape.
    #[error("malformed jira response: {0}")]
    Response(String),

    /// Client-side configuration problem detected at construction.
    #[error("jira client configuration invalid: {0}")]
    Config(String),
}

impl JiraClientError {
    /// Whether retrying at the next tick can plausibly succeed without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JiraClientError::Transient(_))
    }
}

impl From<reqwest::Error> for JiraClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_server_error() => {
                JiraClientError::Transient(err.to_string())
            }
            Some(status) => JiraClientError::Fatal {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => JiraClientError::Transient(err.to_string()),
        }
    }
}
