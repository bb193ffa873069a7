//! Project indexer coordinator.
//!
//! Long-lived loop that discovers projects, decides when each one is due
//! for an incremental or full update, and dispatches indexer runs to a
//! bounded worker pool. Run requests travel over a bounded queue; results
//! come back on a report channel drained by the loop, so the only shared
//! mutable state is the per-project state map behind one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use river_builder::IssueIndexStructureBuilder;
use river_jira::JiraClient;
use river_search::{DatetimeStore, SearchBackend};
use river_types::config::JiraSettings;

use crate::activity::ActivityLogWriter;
use crate::indexer::{IndexerContext, ProjectIndexer, RunOutcome, RunReport, UpdateMode};
use crate::projects::ProjectCatalog;

/// Scheduling parameters of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Worker budget; when above 1, one slot stays reserved for
    /// incremental work so long full runs cannot starve freshness.
    pub max_indexing_threads: usize,

    /// Cadence of incremental updates per project.
    pub index_update_period: Duration,

    /// Cadence of full updates per project; zero disables them.
    pub index_full_update_period: Duration,

    /// Wake-up interval of the coordinator loop.
    pub tick_interval: std::time::Duration,
}

impl CoordinatorConfig {
    pub fn from_settings(settings: &JiraSettings) -> Self {
        Self {
            max_indexing_threads: settings.max_indexing_threads.max(1),
            index_update_period: settings.index_update_period(),
            index_full_update_period: settings.index_full_update_period(),
            tick_interval: std::time::Duration::from_secs(settings.coordinator_tick_secs.max(1)),
        }
    }

    fn full_updates_enabled(&self) -> bool {
        self.index_full_update_period > Duration::zero()
    }

    /// Maximum full-update runs allowed in flight at once.
    fn full_update_budget(&self) -> usize {
        if self.max_indexing_threads > 1 {
            self.max_indexing_threads - 1
        } else {
            self.max_indexing_threads
        }
    }
}

#[derive(Debug, Default)]
struct ProjectState {
    last_incremental_start: Option<DateTime<Utc>>,
    last_full_start: Option<DateTime<Utc>>,
    force_full: bool,
    in_flight: Option<UpdateMode>,
    /// Set when the last run failed; cleared at the next tick so failed
    /// projects are retried on tick cadence, not immediately.
    deferred: bool,
}

#[derive(Default)]
struct CoordinatorState {
    projects: HashMap<String, ProjectState>,
    /// Project keys in discovery order; drives round-robin fairness.
    order: Vec<String>,
    /// Round-robin position: index to start scanning from next.
    cursor: usize,
}

impl CoordinatorState {
    /// Bring the discovery-ordered key list up to date, preserving the
    /// insertion order of previously known projects.
    fn sync_order(&mut self, keys: &[String]) {
        self.order.retain(|key| keys.contains(key));
        for key in keys {
            if !self.order.contains(key) {
                self.order.push(key.clone());
            }
        }
        if self.order.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor %= self.order.len();
        }
    }

    fn in_flight_count(&self) -> usize {
        self.projects
            .values()
            .filter(|p| p.in_flight.is_some())
            .count()
    }

    fn in_flight_full_count(&self) -> usize {
        self.projects
            .values()
            .filter(|p| p.in_flight == Some(UpdateMode::Full))
            .count()
    }
}

struct CoordinatorShared {
    state: Mutex<CoordinatorState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunRequest {
    project_key: String,
    mode: UpdateMode,
}

/// Cloneable operational handle to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<CoordinatorShared>,
    cancel: CancellationToken,
}

impl CoordinatorHandle {
    /// Request a full reindex of one project (returns its key) or of all
    /// known projects (returns the comma-joined key list, empty when no
    /// projects are known). Returns `None` when a named project is
    /// unknown.
    pub fn force_full_reindex(&self, project_key: Option<&str>) -> Option<String> {
        let mut state = self.shared.state.lock().unwrap();
        match project_key {
            Some(key) => {
                if !state.order.iter().any(|k| k == key) {
                    return None;
                }
                state
                    .projects
                    .entry(key.to_string())
                    .or_default()
                    .force_full = true;
                info!(project = key, "Full reindex forced");
                Some(key.to_string())
            }
            None => {
                let keys = state.order.clone();
                for key in &keys {
                    state.projects.entry(key.clone()).or_default().force_full = true;
                }
                info!(projects = keys.len(), "Full reindex forced for all projects");
                Some(keys.join(","))
            }
        }
    }

    /// Currently known indexable project keys, in discovery order.
    pub fn indexed_project_keys(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().order.clone()
    }

    /// Signal shutdown; in-flight runs observe the cancellation and exit
    /// promptly, discarding their in-progress page.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Long-lived coordinator driving per-project indexer runs.
pub struct IndexerCoordinator {
    cfg: CoordinatorConfig,
    catalog: ProjectCatalog,
    ctx: IndexerContext,
    activity: Option<ActivityLogWriter>,
    shared: Arc<CoordinatorShared>,
    cancel: CancellationToken,
    request_tx: mpsc::Sender<RunRequest>,
    request_rx: Option<mpsc::Receiver<RunRequest>>,
    report_tx: mpsc::UnboundedSender<RunReport>,
    report_rx: Option<mpsc::UnboundedReceiver<RunReport>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl IndexerCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: CoordinatorConfig,
        jira: Arc<dyn JiraClient>,
        backend: Arc<dyn SearchBackend>,
        builder: Arc<IssueIndexStructureBuilder>,
        store: Arc<DatetimeStore>,
        catalog: ProjectCatalog,
        activity: Option<ActivityLogWriter>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel(cfg.max_indexing_threads.max(1));
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            catalog,
            ctx: IndexerContext {
                jira,
                backend,
                builder,
                store,
                cancel: cancel.clone(),
            },
            activity,
            shared: Arc::new(CoordinatorShared {
                state: Mutex::new(CoordinatorState::default()),
            }),
            cancel,
            request_tx,
            request_rx: Some(request_rx),
            report_tx,
            report_rx: Some(report_rx),
            worker_handles: Vec::new(),
        }
    }

    /// Operational handle, valid for the coordinator's whole lifetime.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run until shutdown is signalled through the handle.
    pub async fn run(mut self) {
        self.spawn_workers();
        info!(
            threads = self.cfg.max_indexing_threads,
            tick_secs = self.cfg.tick_interval.as_secs(),
            "Project indexer coordinator started"
        );

        let cancel = self.cancel.clone();
        let mut report_rx = self.report_rx.take().expect("report receiver taken twice");
        let mut interval = tokio::time::interval(self.cfg.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
                report = report_rx.recv() => {
                    if let Some(report) = report {
                        self.handle_report(report).await;
                    }
                }
            }
        }

        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
        info!("Project indexer coordinator stopped");
    }

    fn spawn_workers(&mut self) {
        let request_rx = Arc::new(tokio::sync::Mutex::new(
            self.request_rx.take().expect("request receiver taken twice"),
        ));
        for worker_id in 0..self.cfg.max_indexing_threads {
            let request_rx = request_rx.clone();
            let report_tx = self.report_tx.clone();
            let ctx = self.ctx.clone();
            let cancel = self.cancel.clone();
            self.worker_handles.push(tokio::spawn(async move {
                loop {
                    let request = {
                        let mut rx = request_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            request = rx.recv() => request,
                        }
                    };
                    let Some(request) = request else { break };
                    debug!(
                        worker = worker_id,
                        project = %request.project_key,
                        mode = %request.mode,
                        "Starting index update"
                    );
                    let indexer =
                        ProjectIndexer::new(request.project_key, request.mode, ctx.clone());
                    let report = indexer.run().await;
                    if report_tx.send(report).is_err() {
                        break;
                    }
                }
            }));
        }
    }

    /// One coordinator wake-up: refresh the project list if stale, then
    /// dispatch every due project the worker budget allows.
    async fn tick(&mut self) {
        let keys = match self.catalog.indexed_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(
                    error = %e,
                    "Project list refresh failed, deferring dispatch this tick"
                );
                return;
            }
        };
        {
            let mut state = self.shared.state.lock().unwrap();
            state.sync_order(&keys);
            // failed projects become eligible again on tick cadence
            for project in state.projects.values_mut() {
                project.deferred = false;
            }
        }
        self.dispatch_due();
    }

    /// Select due projects round-robin and hand them to the worker pool,
    /// respecting the total budget and the full-update slot reservation.
    fn dispatch_due(&self) {
        let now = Utc::now();
        let requests = self.collect_due(now);
        for request in requests {
            debug!(project = %request.project_key, mode = %request.mode, "Dispatching index update");
            if let Err(e) = self.request_tx.try_send(request.clone()) {
                warn!(project = %request.project_key, error = %e, "Failed to enqueue index update");
                let mut state = self.shared.state.lock().unwrap();
                if let Some(project) = state.projects.get_mut(&request.project_key) {
                    project.in_flight = None;
                }
            }
        }
    }

    fn collect_due(&self, now: DateTime<Utc>) -> Vec<RunRequest> {
        let mut state = self.shared.state.lock().unwrap();
        let project_count = state.order.len();
        if project_count == 0 {
            return Vec::new();
        }

        let total_budget = self.cfg.max_indexing_threads;
        let full_budget = self.cfg.full_update_budget();
        let full_enabled = self.cfg.full_updates_enabled();
        let update_period = self.cfg.index_update_period;
        let full_period = self.cfg.index_full_update_period;

        let mut in_flight = state.in_flight_count();
        let mut in_flight_full = state.in_flight_full_count();
        let mut requests = Vec::new();
        let scan_start = state.cursor % project_count;

        for offset in 0..project_count {
            if in_flight >= total_budget {
                break;
            }
            let idx = (scan_start + offset) % project_count;
            let key = state.order[idx].clone();

            let mode = {
                let project = state.projects.entry(key.clone()).or_default();
                if project.in_flight.is_some() || project.deferred {
                    continue;
                }
                let full_due = project.force_full
                    || (full_enabled
                        && project
                            .last_full_start
                            .map_or(true, |at| now - at >= full_period));
                if full_due {
                    if in_flight_full >= full_budget {
                        // reservation keeps a slot free for incremental
                        // work; the project stays due for a later pass
                        continue;
                    }
                    project.in_flight = Some(UpdateMode::Full);
                    UpdateMode::Full
                } else if project
                    .last_incremental_start
                    .map_or(true, |at| now - at >= update_period)
                {
                    project.in_flight = Some(UpdateMode::Incremental);
                    UpdateMode::Incremental
                } else {
                    continue;
                }
            };

            if mode.is_full() {
                in_flight_full += 1;
            }
            in_flight += 1;
            state.cursor = (idx + 1) % project_count;
            requests.push(RunRequest {
                project_key: key,
                mode,
            });
        }
        requests
    }

    /// Apply a finished run to the project state, log it, and reuse the
    /// freed slot right away.
    async fn handle_report(&mut self, report: RunReport) {
        {
            let mut state = self.shared.state.lock().unwrap();
            let project = state.projects.entry(report.project_key.clone()).or_default();
            project.in_flight = None;
            match &report.outcome {
                RunOutcome::Ok => {
                    if report.mode.is_full() {
                        project.last_full_start = Some(report.start);
                        project.force_full = false;
                    } else {
                        project.last_incremental_start = Some(report.start);
                    }
                }
                RunOutcome::Failed(_) => {
                    project.deferred = true;
                }
                RunOutcome::Interrupted => {
                    project.deferred = true;
                    info!(project = %report.project_key, "Index update marked as interrupted");
                }
            }
        }

        if !report.outcome.is_interrupted() {
            if let Some(activity) = &self.activity {
                activity.record(&report).await;
            }
        }

        if !self.cancel.is_cancelled() {
            self.dispatch_due();
        }
    }
}
