//! Indexable project discovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use river_jira::{JiraClient, JiraClientError};
use river_types::config::JiraSettings;

/// Provides the list of project keys to index.
///
/// Either a static list from configuration (used verbatim, never
/// refreshed), or a periodically refreshed list from the upstream with
/// configured exclusions subtracted. A refresh failure keeps the previous
/// list and propagates so the caller can defer dispatching for that tick.
pub struct ProjectCatalog {
    jira: Arc<dyn JiraClient>,
    static_keys: Option<Vec<String>>,
    excluded_keys: Vec<String>,
    refresh_interval: Duration,
    cached: Vec<String>,
    next_refresh: Option<Instant>,
}

impl ProjectCatalog {
    pub fn new(
        jira: Arc<dyn JiraClient>,
        static_keys: Option<Vec<String>>,
        excluded_keys: Vec<String>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            jira,
            static_keys,
            excluded_keys,
            refresh_interval,
            cached: Vec::new(),
            next_refresh: None,
        }
    }

    pub fn from_settings(jira: Arc<dyn JiraClient>, settings: &JiraSettings) -> Self {
        Self::new(
            jira,
            settings.indexed_keys(),
            settings.excluded_keys(),
            Duration::from_secs(settings.projects_refresh_secs),
        )
    }

    /// Current project keys to index, refreshing from the upstream when the
    /// cached list went stale.
    pub async fn indexed_keys(&mut self) -> Result<Vec<String>, JiraClientError> {
        if let Some(static_keys) = &self.static_keys {
            return Ok(static_keys.clone());
        }

        let now = Instant::now();
        if self.next_refresh.map_or(true, |at| now >= at) {
            let keys = self.jira.list_project_keys().await?;
            self.cached = keys
                .into_iter()
                .filter(|key| !self.excluded_keys.contains(key))
                .collect();
            self.next_refresh = Some(now + self.refresh_interval);
            info!(count = self.cached.len(), "Refreshed indexable project list");
        }
        Ok(self.cached.clone())
    }
}
