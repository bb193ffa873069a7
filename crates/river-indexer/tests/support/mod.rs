//! Shared fixtures for indexer and coordinator tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use river_builder::IssueIndexStructureBuilder;
use river_indexer::{
    ActivityLogWriter, CoordinatorConfig, IndexerContext, IndexerCoordinator, ProjectCatalog,
};
use river_jira::{ChangedIssuesPage, JiraClient, JiraClientError};
use river_search::{DatetimeStore, InMemoryBackend, SearchBackend};
use river_types::config::{ActivityLogSettings, IndexSettings};

pub const RIVER_NAME: &str = "test_river";
pub const INDEX_NAME: &str = "issues";
pub const STATE_INDEX: &str = "_river";
pub const ACTIVITY_INDEX: &str = "activity";
pub const URL_BASE: &str = "https://issues.example.org";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub project_key: String,
    pub start_at: usize,
    pub updated_after: Option<DateTime<Utc>>,
    pub at: Instant,
}

/// Scriptable upstream double with concurrency tracking.
#[derive(Default)]
pub struct MockJiraClient {
    projects: Mutex<Vec<String>>,
    pages: Mutex<HashMap<String, VecDeque<ChangedIssuesPage>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    active_per_project: Mutex<HashMap<String, usize>>,
    max_active_per_project: Mutex<HashMap<String, usize>>,
    fail_next_list: AtomicBool,
    fail_changed_always: AtomicBool,
}

impl MockJiraClient {
    pub fn with_projects(keys: &[&str]) -> Arc<Self> {
        let mock = Self::default();
        *mock.projects.lock().unwrap() = keys.iter().map(|k| k.to_string()).collect();
        Arc::new(mock)
    }

    /// Queue one scripted page for a project; once the queue is drained,
    /// further calls return an empty page.
    pub fn push_page(&self, project_key: &str, page: ChangedIssuesPage) {
        self.pages
            .lock()
            .unwrap()
            .entry(project_key.to_string())
            .or_default()
            .push_back(page);
    }

    /// Artificial latency for a project's search calls.
    pub fn set_delay(&self, project_key: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(project_key.to_string(), delay);
    }

    pub fn fail_next_project_list(&self) {
        self.fail_next_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_all_changed_issues(&self, fail: bool) {
        self.fail_changed_always.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of concurrently active search calls observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently active search calls for one project.
    pub fn max_active_for(&self, project_key: &str) -> usize {
        self.max_active_per_project
            .lock()
            .unwrap()
            .get(project_key)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JiraClient for MockJiraClient {
    async fn list_project_keys(&self) -> Result<Vec<String>, JiraClientError> {
        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            return Err(JiraClientError::Transient(
                "injected project list failure".into(),
            ));
        }
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn changed_issues(
        &self,
        project_key: &str,
        start_at: usize,
        updated_after: Option<DateTime<Utc>>,
        _max_results: Option<usize>,
    ) -> Result<ChangedIssuesPage, JiraClientError> {
        self.calls.lock().unwrap().push(RecordedCall {
            project_key: project_key.to_string(),
            start_at,
            updated_after,
            at: Instant::now(),
        });
        if self.fail_changed_always.load(Ordering::SeqCst) {
            return Err(JiraClientError::Transient(
                "injected upstream failure".into(),
            ));
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        {
            let mut per = self.active_per_project.lock().unwrap();
            let count = per.entry(project_key.to_string()).or_insert(0);
            *count += 1;
            let mut max = self.max_active_per_project.lock().unwrap();
            let entry = max.entry(project_key.to_string()).or_insert(0);
            if *count > *entry {
                *entry = *count;
            }
        }

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(project_key)
            .copied()
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page = self
            .pages
            .lock()
            .unwrap()
            .get_mut(project_key)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ChangedIssuesPage {
                total: 0,
                start_at,
                issues: Vec::new(),
            });

        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self
            .active_per_project
            .lock()
            .unwrap()
            .get_mut(project_key)
        {
            *count -= 1;
        }
        Ok(page)
    }
}

/// Minimal upstream issue record.
pub fn issue(key: &str, updated: &str) -> Value {
    let project = key.split('-').next().unwrap_or(key);
    json!({
        "key": key,
        "fields": {
            "updated": updated,
            "summary": format!("Issue {key}"),
            "project": { "key": project }
        }
    })
}

pub fn page(total: usize, start_at: usize, issues: Vec<Value>) -> ChangedIssuesPage {
    ChangedIssuesPage {
        total,
        start_at,
        issues,
    }
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Collaborator set for direct `ProjectIndexer` runs.
pub struct TestRig {
    pub backend: Arc<InMemoryBackend>,
    pub jira: Arc<MockJiraClient>,
    pub store: Arc<DatetimeStore>,
    pub ctx: IndexerContext,
}

pub fn rig() -> TestRig {
    rig_with_settings(&IndexSettings::default())
}

pub fn rig_with_settings(settings: &IndexSettings) -> TestRig {
    let backend = Arc::new(InMemoryBackend::new());
    let jira = Arc::new(MockJiraClient::default());
    let builder = Arc::new(
        IssueIndexStructureBuilder::new(RIVER_NAME, INDEX_NAME, URL_BASE, settings).unwrap(),
    );
    let store = Arc::new(DatetimeStore::new(
        backend.clone(),
        STATE_INDEX,
        RIVER_NAME,
    ));
    let ctx = IndexerContext {
        jira: jira.clone(),
        backend: backend.clone(),
        builder,
        store: store.clone(),
        cancel: CancellationToken::new(),
    };
    TestRig {
        backend,
        jira,
        store,
        ctx,
    }
}

/// Seed a stored watermark so a later run is not promoted to full.
pub async fn preset_watermark(backend: &InMemoryBackend, project_key: &str, value: DateTime<Utc>) {
    backend
        .index_document(
            STATE_INDEX,
            RIVER_NAME,
            &format!("_lastIndexedIssueUpdateDate_{project_key}"),
            json!({
                "projectKey": project_key,
                "propertyName": "lastIndexedIssueUpdateDate",
                "value": value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            }),
        )
        .await
        .unwrap();
}

/// Raw stored watermark value for a project, as an ISO string.
pub fn stored_watermark(backend: &InMemoryBackend, project_key: &str) -> Option<String> {
    backend
        .document(
            STATE_INDEX,
            &format!("_lastIndexedIssueUpdateDate_{project_key}"),
        )
        .and_then(|doc| doc["value"].as_str().map(str::to_string))
}

/// Activity records written so far, as (updateType, result, project) tuples.
pub fn activity_records(backend: &InMemoryBackend) -> Vec<(String, String, String)> {
    backend
        .document_ids(ACTIVITY_INDEX)
        .iter()
        .filter_map(|id| backend.document(ACTIVITY_INDEX, id))
        .map(|doc| {
            (
                doc["updateType"].as_str().unwrap_or_default().to_string(),
                doc["result"].as_str().unwrap_or_default().to_string(),
                doc["projectKey"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

/// Build a coordinator wired to the mock upstream, an in-memory backend and
/// an activity log.
pub fn coordinator(
    cfg: CoordinatorConfig,
    jira: Arc<MockJiraClient>,
    backend: Arc<InMemoryBackend>,
    static_keys: Option<Vec<String>>,
    refresh_interval: Duration,
) -> IndexerCoordinator {
    let builder = Arc::new(
        IssueIndexStructureBuilder::new(RIVER_NAME, INDEX_NAME, URL_BASE, &IndexSettings::default())
            .unwrap(),
    );
    let store = Arc::new(DatetimeStore::new(
        backend.clone(),
        STATE_INDEX,
        RIVER_NAME,
    ));
    let catalog = ProjectCatalog::new(jira.clone(), static_keys, Vec::new(), refresh_interval);
    let activity = ActivityLogWriter::new(
        backend.clone(),
        &ActivityLogSettings {
            index: ACTIVITY_INDEX.to_string(),
            doc_type: "jira_river_indexupdate".to_string(),
        },
    );
    IndexerCoordinator::new(
        cfg,
        jira,
        backend,
        builder,
        store,
        catalog,
        Some(activity),
    )
}
