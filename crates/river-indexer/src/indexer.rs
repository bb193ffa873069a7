//! One-shot project indexer.
//!
//! Runs a single full or incremental update pass for one project, then is
//! discarded. The pull loop is watermark-bounded and paginated; the
//! upstream is contracted to return issues ordered by update time
//! ascending, which the pagination advancement depends on.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use river_builder::IssueIndexStructureBuilder;
use river_jira::JiraClient;
use river_search::{BulkOp, DatetimeStore, SearchBackend};
use river_types::time::truncate_to_minute;

use crate::error::IndexerError;

/// Property name the per-project watermark is stored under.
pub const LAST_INDEXED_ISSUE_UPDATE_DATE_PROPERTY: &str = "lastIndexedIssueUpdateDate";

/// Seconds the watermark is bumped forward by when a run makes progress
/// but cannot advance it past the minute it started from.
const LIVELOCK_GUARD_BUMP_SECS: i64 = 64;

const DELETE_SCROLL_PAGE_SIZE: usize = 100;

/// Kind of update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Incremental,
    Full,
}

impl UpdateMode {
    pub fn is_full(&self) -> bool {
        matches!(self, UpdateMode::Full)
    }

    /// Form used in activity-log records.
    pub fn as_activity_str(&self) -> &'static str {
        match self {
            UpdateMode::Incremental => "INCREMENTAL",
            UpdateMode::Full => "FULL",
        }
    }
}

impl std::fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateMode::Incremental => write!(f, "incremental"),
            UpdateMode::Full => write!(f, "full"),
        }
    }
}

/// Terminal outcome of one indexer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Run completed; watermark and (on full) deletions applied.
    Ok,
    /// Run failed; the error message is carried for reporting.
    Failed(String),
    /// Shutdown was observed mid-run; the in-progress page was discarded
    /// and no error is reported.
    Interrupted,
}

impl RunOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RunOutcome::Ok)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted)
    }
}

/// Result of one indexer run, reported back to the coordinator.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub project_key: String,
    /// Effective mode; an incremental run with no stored watermark is
    /// promoted to full.
    pub mode: UpdateMode,
    pub outcome: RunOutcome,
    pub issues_updated: usize,
    pub issues_deleted: usize,
    pub start: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Shared collaborators handed to every indexer run.
#[derive(Clone)]
pub struct IndexerContext {
    pub jira: Arc<dyn JiraClient>,
    pub backend: Arc<dyn SearchBackend>,
    pub builder: Arc<IssueIndexStructureBuilder>,
    pub store: Arc<DatetimeStore>,
    pub cancel: CancellationToken,
}

enum Flow {
    Completed,
    Interrupted,
}

/// Runs one index update pass for one project. Single use; create a new
/// instance for every run.
pub struct ProjectIndexer {
    ctx: IndexerContext,
    project_key: String,
    full_update: bool,
    updated_count: usize,
    delete_count: usize,
}

impl ProjectIndexer {
    pub fn new(project_key: impl Into<String>, mode: UpdateMode, ctx: IndexerContext) -> Self {
        Self {
            ctx,
            project_key: project_key.into(),
            full_update: mode.is_full(),
            updated_count: 0,
            delete_count: 0,
        }
    }

    /// Execute the run to completion, cancellation or failure.
    pub async fn run(mut self) -> RunReport {
        let start = Utc::now();
        let started = Instant::now();
        let result = self.execute(start).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mode = if self.full_update {
            UpdateMode::Full
        } else {
            UpdateMode::Incremental
        };

        let outcome = match result {
            Ok(Flow::Completed) => {
                info!(
                    project = %self.project_key,
                    mode = %mode,
                    updated = self.updated_count,
                    deleted = self.delete_count,
                    elapsed_ms,
                    "Finished index update"
                );
                RunOutcome::Ok
            }
            Ok(Flow::Interrupted) => {
                info!(project = %self.project_key, mode = %mode, "Index update interrupted");
                RunOutcome::Interrupted
            }
            Err(e) => {
                error!(project = %self.project_key, mode = %mode, error = %e, "Index update failed");
                RunOutcome::Failed(e.to_string())
            }
        };

        RunReport {
            project_key: self.project_key,
            mode,
            outcome,
            issues_updated: self.updated_count,
            issues_deleted: self.delete_count,
            start,
            elapsed_ms,
        }
    }

    async fn execute(&mut self, start: DateTime<Utc>) -> Result<Flow, IndexerError> {
        if let Flow::Interrupted = self.process_update().await? {
            return Ok(Flow::Interrupted);
        }
        if self.full_update {
            return self.process_delete(start).await;
        }
        Ok(Flow::Completed)
    }

    fn is_cancelled(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    /// Watermark-bounded paginated pull from the upstream.
    async fn process_update(&mut self) -> Result<Flow, IndexerError> {
        self.updated_count = 0;
        let initial_watermark = self
            .ctx
            .store
            .read_datetime_value(&self.project_key, LAST_INDEXED_ISSUE_UPDATE_DATE_PROPERTY)
            .await?
            .map(truncate_to_minute);

        match initial_watermark {
            Some(after) => info!(
                project = %self.project_key,
                updated_after = %after,
                "Processing updates for issues updated after watermark"
            ),
            None => {
                // no watermark means whole-history indexing, which implies
                // the delete pass must run too
                self.full_update = true;
                info!(
                    project = %self.project_key,
                    "No stored watermark, processing whole issue history"
                );
            }
        }

        let mut updated_after = initial_watermark;
        let mut last_updated: Option<DateTime<Utc>> = None;
        let mut start_at = 0;

        loop {
            if self.is_cancelled() {
                return Ok(Flow::Interrupted);
            }

            debug!(
                project = %self.project_key,
                start_at,
                updated_after = ?updated_after,
                "Requesting changed issues page"
            );
            let page = self
                .ctx
                .jira
                .changed_issues(&self.project_key, start_at, updated_after, None)
                .await?;
            if page.issues.is_empty() {
                break;
            }

            let mut first_updated: Option<DateTime<Utc>> = None;
            let mut page_last_updated: Option<DateTime<Utc>> = None;
            let mut ops: Vec<BulkOp> = Vec::new();

            for issue in &page.issues {
                let issue_key = self.ctx.builder.extract_issue_key(issue).ok_or_else(|| {
                    IndexerError::IssueData {
                        project: self.project_key.clone(),
                        reason: "'key' field not found in issue data".into(),
                    }
                })?;
                let updated = self.ctx.builder.extract_issue_updated(issue).ok_or_else(|| {
                    IndexerError::IssueData {
                        project: self.project_key.clone(),
                        reason: format!(
                            "'updated' field not found in issue data for key {issue_key}"
                        ),
                    }
                })?;
                if page_last_updated.is_some_and(|prev| updated < prev) {
                    return Err(IndexerError::OutOfOrderPage(self.project_key.clone()));
                }
                debug!(issue = %issue_key, updated = %updated, "Indexing issue");
                if first_updated.is_none() {
                    first_updated = Some(updated);
                }
                page_last_updated = Some(updated);

                self.ctx.builder.index_issue(&mut ops, &self.project_key, issue)?;
                self.updated_count += 1;

                if self.is_cancelled() {
                    // the in-progress page is discarded; the watermark
                    // reflects only fully written pages
                    return Ok(Flow::Interrupted);
                }
            }

            let page_last_minute = truncate_to_minute(
                page_last_updated.unwrap_or_else(Utc::now),
            );
            let first_minute = truncate_to_minute(first_updated.unwrap_or_else(Utc::now));
            last_updated = Some(page_last_minute);

            self.ctx
                .store
                .store_datetime_value(
                    &self.project_key,
                    LAST_INDEXED_ISSUE_UPDATE_DATE_PROPERTY,
                    page_last_minute,
                    Some(&mut ops),
                )
                .await?;

            if self.is_cancelled() {
                return Ok(Flow::Interrupted);
            }
            self.ctx.backend.bulk(ops).await?;

            let page_len = page.issue_count();
            if page_last_minute != first_minute {
                // issues updated in different minutes: safe to re-anchor the
                // query window at the latest observed time
                updated_after = Some(page_last_minute);
                start_at = 0;
                if page.total <= page.start_at + page_len {
                    break;
                }
            } else {
                // whole page within the watermark minute: advance by offset
                // inside the same window
                start_at = page.start_at + page_len;
                if page.total <= start_at {
                    break;
                }
            }
        }

        // livelock guard: progress was made but the watermark could not
        // move past the minute it started at, so bump it just beyond that
        // minute or the same issues would be re-fetched forever
        if self.updated_count > 0 {
            if let (Some(initial), Some(last)) = (initial_watermark, last_updated) {
                if initial == last {
                    let bumped = last + Duration::seconds(LIVELOCK_GUARD_BUMP_SECS);
                    debug!(
                        project = %self.project_key,
                        watermark = %bumped,
                        "Bumping watermark past its minute"
                    );
                    self.ctx
                        .store
                        .store_datetime_value(
                            &self.project_key,
                            LAST_INDEXED_ISSUE_UPDATE_DATE_PROPERTY,
                            bumped,
                            None,
                        )
                        .await?;
                }
            }
        }

        Ok(Flow::Completed)
    }

    /// Sweep-delete documents of this project that were not re-ingested
    /// after `bound_date` (the run's start), meaning they vanished
    /// upstream. Only runs on full updates.
    async fn process_delete(&mut self, bound_date: DateTime<Utc>) -> Result<Flow, IndexerError> {
        self.delete_count = 0;
        let index_name = self.ctx.builder.index_name().to_string();
        self.ctx.backend.refresh(&index_name).await?;

        debug!(
            project = %self.project_key,
            bound = %bound_date,
            "Deleting indexed documents not updated during this run"
        );
        let query = self.ctx.builder.stale_docs_query(&self.project_key, bound_date);
        let mut cursor = self
            .ctx
            .backend
            .scroll_stale_docs(&index_name, query, DELETE_SCROLL_PAGE_SIZE)
            .await?;

        let mut ops: Vec<BulkOp> = Vec::new();
        loop {
            if self.is_cancelled() {
                return Ok(Flow::Interrupted);
            }
            let hits = cursor.next_page().await?;
            if hits.is_empty() {
                break;
            }
            for hit in &hits {
                debug!(project = %self.project_key, document = %hit.id, "Deleting indexed document");
                self.ctx.builder.delete_issue(&mut ops, hit);
                self.delete_count += 1;
            }
        }

        if !ops.is_empty() {
            if self.is_cancelled() {
                return Ok(Flow::Interrupted);
            }
            self.ctx.backend.bulk(ops).await?;
        }
        Ok(Flow::Completed)
    }
}
