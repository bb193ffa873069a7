//! Upstream client contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::JiraClientError;

/// One page of issues changed after a bound, as returned by the upstream
/// search endpoint.
#[derive(Debug, Clone, Default)]
pub struct ChangedIssuesPage {
    /// Total matches for the query, across all pages.
    pub total: usize,

    /// Offset of this page within the result set.
    pub start_at: usize,

    /// Issue records, ordered by `fields.updated` ascending.
    pub issues: Vec<Value>,
}

impl ChangedIssuesPage {
    /// Number of issues on this page.
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

/// Read-only view of the upstream issue tracker.
#[async_trait]
pub trait JiraClient: Send + Sync {
    /// List all project keys visible to the configured user.
    async fn list_project_keys(&self) -> Result<Vec<String>, JiraClientError>;

    /// Fetch one page of issues for a project, optionally bounded below by
    /// an update timestamp (minute precision) and paginated by `start_at`.
    async fn changed_issues(
        &self,
        project_key: &str,
        start_at: usize,
        updated_after: Option<DateTime<Utc>>,
        max_results: Option<usize>,
    ) -> Result<ChangedIssuesPage, JiraClientError>;
}
