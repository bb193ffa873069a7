//! Error types for indexer runs.

use thiserror::Error;

use river_builder::BuilderError;
use river_jira::JiraClientError;
use river_search::BackendError;

/// Errors that terminate one project indexing run. A failing run never
/// affects other projects; the coordinator retries at its next tick.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Upstream call failed.
    #[error(transparent)]
    Jira(#[from] JiraClientError),

    /// Search backend call failed. The watermark is never advanced past
    /// the last successfully executed bulk.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Document transformation failed.
    #[error(transparent)]
    Builder(#[from] BuilderError),

    /// An issue record lacked a field the run cannot continue without.
    #[error("issue data invalid for project {project}: {reason}")]
    IssueData { project: String, reason: String },

    /// The upstream returned a page that is not ascending by update time;
    /// the pagination advancement depends on that ordering.
    #[error("upstream returned issues out of ascending update order for project {0}")]
    OutOfOrderPage(String),
}
