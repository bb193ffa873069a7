//! REST implementation of the upstream client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use river_types::config::JiraSettings;
use river_types::time::truncate_to_minute;

use crate::client::{ChangedIssuesPage, JiraClient};
use crate::error::JiraClientError;

/// Client for the JIRA 2 REST search API.
pub struct JiraRestClient {
    client: Client,
    search_url: String,
    projects_url: String,
    username: Option<String>,
    pwd: Option<String>,
    jql_time_zone: Tz,
    list_issues_max: usize,
    required_fields: String,
}

impl JiraRestClient {
    /// Build a client from settings. `required_fields` is the CSV list of
    /// issue fields the document builder needs from every search call.
    pub fn new(
        settings: &JiraSettings,
        required_fields: impl Into<String>,
    ) -> Result<Self, JiraClientError> {
        let base = settings.url_base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(JiraClientError::Config("url_base must be defined".into()));
        }
        reqwest::Url::parse(base)
            .map_err(|e| JiraClientError::Config(format!("invalid url_base '{base}': {e}")))?;

        let jql_time_zone = settings
            .parse_jql_time_zone()
            .map_err(|e| JiraClientError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| JiraClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            search_url: format!("{base}/rest/api/2/search"),
            projects_url: format!("{base}/rest/api/2/project"),
            username: settings
                .username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            pwd: settings.pwd.clone(),
            jql_time_zone,
            list_issues_max: settings.max_issues_per_request.max(1),
            required_fields: required_fields.into(),
        })
    }

    /// Timezone used to format JQL timestamps, for the startup log.
    pub fn jql_time_zone(&self) -> Tz {
        self.jql_time_zone
    }

    /// Build the JQL fragment selecting changed issues for a project,
    /// ordered ascending by update time. The lower bound is formatted with
    /// minute precision in the configured timezone.
    fn prepare_jql(&self, project_key: &str, updated_after: Option<DateTime<Utc>>) -> String {
        match updated_after {
            Some(bound) => {
                let local = truncate_to_minute(bound).with_timezone(&self.jql_time_zone);
                format!(
                    "project = {} AND updated >= \"{}\" ORDER BY updated ASC",
                    project_key,
                    local.format("%Y-%m-%d %H:%M")
                )
            }
            None => format!("project = {project_key} ORDER BY updated ASC"),
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.pwd.as_deref()),
            None => request,
        }
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, JiraClientError> {
        let response = self.apply_auth(request).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                JiraClientError::Transient(e.to_string())
            } else {
                JiraClientError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.is_server_error() {
                Err(JiraClientError::Transient(format!("HTTP {status}: {body}")))
            } else {
                Err(JiraClientError::Fatal {
                    status: status.as_u16(),
                    body,
                })
            };
        }

        response
            .json()
            .await
            .map_err(|e| JiraClientError::Response(e.to_string()))
    }

    fn parse_search_response(body: &Value) -> Result<ChangedIssuesPage, JiraClientError> {
        let total = body
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| JiraClientError::Response("missing 'total' in search result".into()))?;
        let start_at = body
            .get("startAt")
            .and_then(Value::as_u64)
            .ok_or_else(|| JiraClientError::Response("missing 'startAt' in search result".into()))?;
        let issues = body
            .get("issues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(ChangedIssuesPage {
            total: total as usize,
            start_at: start_at as usize,
            issues,
        })
    }

    fn parse_project_keys(body: &Value) -> Result<Vec<String>, JiraClientError> {
        body.as_array()
            .ok_or_else(|| JiraClientError::Response("project list is not an array".into()))?
            .iter()
            .map(|project| {
                project
                    .get("key")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| JiraClientError::Response("project without 'key'".into()))
            })
            .collect()
    }
}

#[async_trait]
impl JiraClient for JiraRestClient {
    async fn list_project_keys(&self) -> Result<Vec<String>, JiraClientError> {
        let body = self.get_json(self.client.get(&self.projects_url)).await?;
        let keys = Self::parse_project_keys(&body)?;
        debug!(count = keys.len(), "Listed upstream projects");
        Ok(keys)
    }

    async fn changed_issues(
        &self,
        project_key: &str,
        start_at: usize,
        updated_after: Option<DateTime<Utc>>,
        max_results: Option<usize>,
    ) -> Result<ChangedIssuesPage, JiraClientError> {
        let jql = self.prepare_jql(project_key, updated_after);
        let max_results = max_results
            .unwrap_or(self.list_issues_max)
            .min(self.list_issues_max);
        debug!(
            project = project_key,
            start_at,
            max_results,
            jql = %jql,
            "Fetching changed issues"
        );
        let start_at_param = start_at.to_string();
        let max_results_param = max_results.to_string();
        let request = self.client.get(&self.search_url).query(&[
            ("jql", jql.as_str()),
            ("startAt", start_at_param.as_str()),
            ("maxResults", max_results_param.as_str()),
            ("fields", self.required_fields.as_str()),
        ]);
        let body = self.get_json(request).await?;
        Self::parse_search_response(&body)
    }
}
