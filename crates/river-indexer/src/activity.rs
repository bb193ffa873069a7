//! Activity log for finished indexing runs.
//!
//! Writes one record per terminal run outcome (OK or ERROR) into a
//! configured index. Best-effort: a failed write is logged locally and
//! never propagated into the indexing pipeline.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use river_search::SearchBackend;
use river_types::config::ActivityLogSettings;
use river_types::time::format_iso_datetime;

use crate::indexer::{RunOutcome, RunReport};

/// Writer for per-run activity records.
pub struct ActivityLogWriter {
    backend: Arc<dyn SearchBackend>,
    index: String,
    doc_type: String,
}

impl ActivityLogWriter {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: &ActivityLogSettings) -> Self {
        Self {
            backend,
            index: settings.index.clone(),
            doc_type: settings.doc_type.clone(),
        }
    }

    /// Record one finished run. Failures are swallowed after logging.
    pub async fn record(&self, report: &RunReport) {
        let document = activity_document(report);
        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self
            .backend
            .index_document(&self.index, &self.doc_type, &id, document)
            .await
        {
            error!(error = %e, "Error during update result writing to the activity log");
        }
    }
}

/// Build the activity record for one finished run.
fn activity_document(report: &RunReport) -> Value {
    let mut document = json!({
        "projectKey": report.project_key,
        "updateType": report.mode.as_activity_str(),
        "result": if report.outcome.is_ok() { "OK" } else { "ERROR" },
        "startDate": format_iso_datetime(report.start),
        "timeElapsed": format!("{}ms", report.elapsed_ms),
        "issuesUpdated": report.issues_updated,
        "issuesDeleted": report.issues_deleted,
    });
    if let RunOutcome::Failed(message) = &report.outcome {
        if !message.is_empty() {
            document["errorMessage"] = Value::String(message.clone());
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::UpdateMode;
    use chrono::{TimeZone, Utc};

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport {
            project_key: "ORG".to_string(),
            mode: UpdateMode::Full,
            outcome,
            issues_updated: 12,
            issues_deleted: 1,
            start: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            elapsed_ms: 1234,
        }
    }

    #[test]
    fn test_activity_document_ok() {
        let doc = activity_document(&report(RunOutcome::Ok));
        assert_eq!(doc["projectKey"], "ORG");
        assert_eq!(doc["updateType"], "FULL");
        assert_eq!(doc["result"], "OK");
        assert_eq!(doc["startDate"], "2024-05-01T10:00:00Z");
        assert_eq!(doc["timeElapsed"], "1234ms");
        assert_eq!(doc["issuesUpdated"], 12);
        assert_eq!(doc["issuesDeleted"], 1);
        assert!(doc.get("errorMessage").is_none());
    }

    #[test]
    fn test_activity_document_error() {
        let doc = activity_document(&report(RunOutcome::Failed("boom".to_string())));
        assert_eq!(doc["result"], "ERROR");
        assert_eq!(doc["errorMessage"], "boom");
    }

    #[tokio::test]
    async fn test_record_writes_to_configured_index() {
        use river_search::InMemoryBackend;

        let backend = Arc::new(InMemoryBackend::new());
        let writer = ActivityLogWriter::new(
            backend.clone(),
            &ActivityLogSettings {
                index: "activity".to_string(),
                doc_type: "jira_river_indexupdate".to_string(),
            },
        );
        writer.record(&report(RunOutcome::Ok)).await;
        assert_eq!(backend.document_count("activity"), 1);
    }
}
