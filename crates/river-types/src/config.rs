//! Configuration loading for jira-river.
//!
//! Layered config: built-in defaults -> config file -> env vars (RIVER_*).
//! CLI flags are applied by the daemon after loading. Validation fails
//! fast at construction so a misconfigured river never starts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Duration;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::RiverError;

/// How issue comments are materialised in the search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentIndexingMode {
    /// Comments are not indexed at all.
    None,
    /// Comments are written as an ordered sub-array inside the issue document.
    #[default]
    Embedded,
    /// Each comment becomes its own document with a parent relation to the issue.
    Child,
    /// Each comment becomes its own document without a parent relation.
    Standalone,
}

impl CommentIndexingMode {
    /// Parse the configuration string form, `None` input selects the default.
    pub fn parse_configuration(value: Option<&str>) -> Result<Self, RiverError> {
        match value.map(|v| v.trim().to_lowercase()) {
            None => Ok(Self::default()),
            Some(v) if v.is_empty() => Ok(Self::default()),
            Some(v) => match v.as_str() {
                "none" => Ok(Self::None),
                "embedded" => Ok(Self::Embedded),
                "child" => Ok(Self::Child),
                "standalone" => Ok(Self::Standalone),
                other => Err(RiverError::Config(format!(
                    "unsupported comment_mode '{other}'"
                ))),
            },
        }
    }

    /// Whether comments must be requested from the upstream at all.
    pub fn requires_comments(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether comments are stored as their own documents.
    pub fn stores_separate_documents(&self) -> bool {
        matches!(self, Self::Child | Self::Standalone)
    }
}

/// Mapping of one output document field to a dotted path in the upstream
/// issue JSON, with an optional value filter applied to object values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    /// Dotted path into the upstream issue record (e.g. `fields.status.name`).
    pub jira_field: String,

    /// Name of a filter in `value_filters` to apply to object values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_filter: Option<String>,
}

/// Upstream tracker connection and scheduling settings (`jira.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSettings {
    /// Base URL of the tracker instance. Required; the REST search path is
    /// appended internally.
    #[serde(default)]
    pub url_base: String,

    /// Basic auth username. Anonymous access when unset.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub pwd: Option<String>,

    /// IANA timezone id used to format JQL timestamps. A wrong value here
    /// can silently lose updates, so the effective zone is logged at startup.
    #[serde(default)]
    pub jql_time_zone: Option<String>,

    /// Per-request timeout in seconds (default: 5).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum issues requested per search call (default: 50).
    #[serde(default = "default_max_issues_per_request")]
    pub max_issues_per_request: usize,

    /// CSV list of project keys to index. When set the list is used
    /// verbatim and never refreshed from the upstream.
    #[serde(default)]
    pub project_keys_indexed: Option<String>,

    /// CSV list of project keys subtracted from the discovered list.
    #[serde(default)]
    pub project_keys_excluded: Option<String>,

    /// Incremental update cadence in seconds (default: 300).
    #[serde(default = "default_index_update_period_secs")]
    pub index_update_period_secs: u64,

    /// Full update cadence in seconds (default: 43200 = 12h; 0 disables
    /// periodic full updates).
    #[serde(default = "default_index_full_update_period_secs")]
    pub index_full_update_period_secs: u64,

    /// Worker budget for parallel project indexing (default: 1).
    #[serde(default = "default_max_indexing_threads")]
    pub max_indexing_threads: usize,

    /// Coordinator wake-up interval in seconds (default: 30).
    #[serde(default = "default_coordinator_tick_secs")]
    pub coordinator_tick_secs: u64,

    /// How often the project list is refreshed from the upstream, in
    /// seconds (default: 1800 = 30 min).
    #[serde(default = "default_projects_refresh_secs")]
    pub projects_refresh_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_issues_per_request() -> usize {
    50
}

fn default_index_update_period_secs() -> u64 {
    5 * 60
}

fn default_index_full_update_period_secs() -> u64 {
    12 * 60 * 60
}

fn default_max_indexing_threads() -> usize {
    1
}

fn default_coordinator_tick_secs() -> u64 {
    30
}

fn default_projects_refresh_secs() -> u64 {
    30 * 60
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            url_base: String::new(),
            username: None,
            pwd: None,
            jql_time_zone: None,
            timeout_secs: default_timeout_secs(),
            max_issues_per_request: default_max_issues_per_request(),
            project_keys_indexed: None,
            project_keys_excluded: None,
            index_update_period_secs: default_index_update_period_secs(),
            index_full_update_period_secs: default_index_full_update_period_secs(),
            max_indexing_threads: default_max_indexing_threads(),
            coordinator_tick_secs: default_coordinator_tick_secs(),
            projects_refresh_secs: default_projects_refresh_secs(),
        }
    }
}

impl JiraSettings {
    /// Parse the configured JQL timezone, defaulting to UTC.
    pub fn parse_jql_time_zone(&self) -> Result<chrono_tz::Tz, RiverError> {
        match &self.jql_time_zone {
            None => Ok(chrono_tz::UTC),
            Some(tz) => tz
                .parse::<chrono_tz::Tz>()
                .map_err(|_| RiverError::InvalidTimezone(tz.clone())),
        }
    }

    /// Statically configured project keys, if any.
    pub fn indexed_keys(&self) -> Option<Vec<String>> {
        self.project_keys_indexed.as_deref().and_then(parse_csv)
    }

    /// Project keys excluded from discovery.
    pub fn excluded_keys(&self) -> Vec<String> {
        self.project_keys_excluded
            .as_deref()
            .and_then(parse_csv)
            .unwrap_or_default()
    }

    /// Incremental update cadence.
    pub fn index_update_period(&self) -> Duration {
        Duration::seconds(self.index_update_period_secs as i64)
    }

    /// Full update cadence; zero disables periodic full updates.
    pub fn index_full_update_period(&self) -> Duration {
        Duration::seconds(self.index_full_update_period_secs as i64)
    }
}

/// Parse a CSV string into trimmed non-empty items. Returns `None` when no
/// items remain, mirroring the "unset" semantics of the config keys.
pub fn parse_csv(value: &str) -> Option<Vec<String>> {
    let items: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Issue index and document-structure settings (`index.*`).
///
/// The field/filter/comment options default from an embedded template when
/// absent; merging and validation happen in the structure builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Target search index. Defaults to the river name.
    #[serde(default)]
    pub index: Option<String>,

    /// Document type for issues (default: `jira_issue`).
    #[serde(rename = "type", default = "default_issue_type")]
    pub doc_type: String,

    /// Document type for comment documents in `child`/`standalone` modes.
    #[serde(default = "default_comment_type")]
    pub comment_type: String,

    /// Output field holding the river name.
    #[serde(default)]
    pub field_river_name: Option<String>,

    /// Output field holding the project key.
    #[serde(default)]
    pub field_project_key: Option<String>,

    /// Output field holding the issue key.
    #[serde(default)]
    pub field_issue_key: Option<String>,

    /// Output field holding the canonical browse URL.
    #[serde(default)]
    pub field_issue_url: Option<String>,

    /// Output field name -> upstream mapping.
    #[serde(default)]
    pub fields: Option<BTreeMap<String, FieldMapping>>,

    /// Named rename maps applied by `value_filter` references.
    #[serde(default)]
    pub value_filters: Option<BTreeMap<String, BTreeMap<String, String>>>,

    /// Comment materialisation mode, see [`CommentIndexingMode`].
    #[serde(default)]
    pub comment_mode: Option<String>,

    /// Issue-document field holding the comment array in `embedded` mode.
    #[serde(default)]
    pub field_comments: Option<String>,

    /// Output field name -> upstream mapping applied to each comment.
    #[serde(default)]
    pub comment_fields: Option<BTreeMap<String, FieldMapping>>,
}

fn default_issue_type() -> String {
    "jira_issue".to_string()
}

fn default_comment_type() -> String {
    "jira_issue_comment".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index: None,
            doc_type: default_issue_type(),
            comment_type: default_comment_type(),
            field_river_name: None,
            field_project_key: None,
            field_issue_key: None,
            field_issue_url: None,
            fields: None,
            value_filters: None,
            comment_mode: None,
            field_comments: None,
            comment_fields: None,
        }
    }
}

/// Activity log settings; the log is disabled when the section is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogSettings {
    /// Search index receiving activity records.
    pub index: String,

    /// Document type for activity records.
    #[serde(rename = "type", default = "default_activity_type")]
    pub doc_type: String,
}

fn default_activity_type() -> String {
    "jira_river_indexupdate".to_string()
}

/// Search backend connection settings (`search.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Base URL of the search backend REST API.
    #[serde(default = "default_search_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_search_timeout_secs() -> u64 {
    30
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

/// Top-level river settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverSettings {
    /// Name of this river instance; stamped into every indexed document.
    #[serde(default = "default_river_name")]
    pub river_name: String,

    /// Private index holding per-project watermarks.
    #[serde(default = "default_state_index")]
    pub state_index: String,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upstream tracker settings.
    #[serde(default)]
    pub jira: JiraSettings,

    /// Search backend settings.
    #[serde(default)]
    pub search: SearchSettings,

    /// Issue index structure settings.
    #[serde(default)]
    pub index: IndexSettings,

    /// Activity log target; disabled when absent.
    #[serde(default)]
    pub activity_log: Option<ActivityLogSettings>,
}

fn default_river_name() -> String {
    "jira_river".to_string()
}

fn default_state_index() -> String {
    "_river".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RiverSettings {
    fn default() -> Self {
        Self {
            river_name: default_river_name(),
            state_index: default_state_index(),
            log_level: default_log_level(),
            jira: JiraSettings::default(),
            search: SearchSettings::default(),
            index: IndexSettings::default(),
            activity_log: None,
        }
    }
}

impl RiverSettings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/jira-river/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RIVER_*, `__` as section separator)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RiverError> {
        let config_dir = ProjectDirs::from("", "", "jira-river")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("RIVER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RiverError::Config(e.to_string()))?;

        let settings: RiverSettings = config
            .try_deserialize()
            .map_err(|e| RiverError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings that must be correct before the river starts.
    pub fn validate(&self) -> Result<(), RiverError> {
        if self.river_name.trim().is_empty() {
            return Err(RiverError::Config("river_name must not be empty".into()));
        }
        if self.jira.url_base.trim().is_empty() {
            return Err(RiverError::Config(
                "jira.url_base not found or empty".into(),
            ));
        }
        if self.jira.max_indexing_threads < 1 {
            return Err(RiverError::Config(
                "jira.max_indexing_threads must be at least 1".into(),
            ));
        }
        if let Some(log) = &self.activity_log {
            if log.index.trim().is_empty() {
                return Err(RiverError::Config(
                    "activity_log.index must be defined with some string".into(),
                ));
            }
        }
        self.jira.parse_jql_time_zone().map(|_| ())
    }

    /// Target index for issue documents, defaulting to the river name.
    pub fn issue_index_name(&self) -> String {
        self.index
            .index
            .clone()
            .unwrap_or_else(|| self.river_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> RiverSettings {
        RiverSettings {
            jira: JiraSettings {
                url_base: "https://issues.example.org".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = RiverSettings::default();
        assert_eq!(settings.river_name, "jira_river");
        assert_eq!(settings.state_index, "_river");
        assert_eq!(settings.jira.timeout_secs, 5);
        assert_eq!(settings.jira.max_issues_per_request, 50);
        assert_eq!(settings.jira.index_update_period_secs, 300);
        assert_eq!(settings.jira.index_full_update_period_secs, 43200);
        assert_eq!(settings.jira.max_indexing_threads, 1);
        assert_eq!(settings.jira.coordinator_tick_secs, 30);
        assert_eq!(settings.jira.projects_refresh_secs, 1800);
        assert_eq!(settings.index.doc_type, "jira_issue");
        assert_eq!(settings.index.comment_type, "jira_issue_comment");
        assert!(settings.activity_log.is_none());
    }

    #[test]
    fn test_validate_requires_url_base() {
        let settings = RiverSettings::default();
        assert!(matches!(settings.validate(), Err(RiverError::Config(_))));

        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let mut settings = valid_settings();
        settings.jira.max_indexing_threads = 0;
        assert!(matches!(settings.validate(), Err(RiverError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_blank_activity_index() {
        let mut settings = valid_settings();
        settings.activity_log = Some(ActivityLogSettings {
            index: "  ".to_string(),
            doc_type: default_activity_type(),
        });
        assert!(matches!(settings.validate(), Err(RiverError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_timezone() {
        let mut settings = valid_settings();
        settings.jira.jql_time_zone = Some("Invalid/Zone".to_string());
        assert!(matches!(
            settings.validate(),
            Err(RiverError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_parse_jql_time_zone() {
        let mut jira = JiraSettings::default();
        assert_eq!(jira.parse_jql_time_zone().unwrap(), chrono_tz::UTC);

        jira.jql_time_zone = Some("America/New_York".to_string());
        assert_eq!(
            jira.parse_jql_time_zone().unwrap().name(),
            "America/New_York"
        );
    }

    #[test]
    fn test_parse_csv() {
        assert_eq!(
            parse_csv("ORG, AS ,,SUPPORT"),
            Some(vec![
                "ORG".to_string(),
                "AS".to_string(),
                "SUPPORT".to_string()
            ])
        );
        assert_eq!(parse_csv("  "), None);
        assert_eq!(parse_csv(",,"), None);
    }

    #[test]
    fn test_indexed_and_excluded_keys() {
        let jira = JiraSettings {
            project_keys_indexed: Some("ORG,AS".to_string()),
            project_keys_excluded: Some("SEC".to_string()),
            ..Default::default()
        };
        assert_eq!(
            jira.indexed_keys(),
            Some(vec!["ORG".to_string(), "AS".to_string()])
        );
        assert_eq!(jira.excluded_keys(), vec!["SEC".to_string()]);

        let jira = JiraSettings::default();
        assert_eq!(jira.indexed_keys(), None);
        assert!(jira.excluded_keys().is_empty());
    }

    #[test]
    fn test_issue_index_name_defaults_to_river_name() {
        let mut settings = valid_settings();
        assert_eq!(settings.issue_index_name(), "jira_river");

        settings.index.index = Some("my_issues".to_string());
        assert_eq!(settings.issue_index_name(), "my_issues");
    }

    #[test]
    fn test_comment_mode_parse() {
        assert_eq!(
            CommentIndexingMode::parse_configuration(None).unwrap(),
            CommentIndexingMode::Embedded
        );
        assert_eq!(
            CommentIndexingMode::parse_configuration(Some("NONE")).unwrap(),
            CommentIndexingMode::None
        );
        assert_eq!(
            CommentIndexingMode::parse_configuration(Some("child")).unwrap(),
            CommentIndexingMode::Child
        );
        assert_eq!(
            CommentIndexingMode::parse_configuration(Some("standalone")).unwrap(),
            CommentIndexingMode::Standalone
        );
        assert!(CommentIndexingMode::parse_configuration(Some("inline")).is_err());
    }

    #[test]
    fn test_comment_mode_predicates() {
        assert!(!CommentIndexingMode::None.requires_comments());
        assert!(CommentIndexingMode::Embedded.requires_comments());
        assert!(!CommentIndexingMode::Embedded.stores_separate_documents());
        assert!(CommentIndexingMode::Child.stores_separate_documents());
        assert!(CommentIndexingMode::Standalone.stores_separate_documents());
    }

    #[test]
    fn test_settings_toml_roundtrip() {
        let toml = r#"
river_name = "my_river"

[jira]
url_base = "https://issues.example.org"
username = "indexer"
pwd = "secret"
project_keys_indexed = "ORG,AS"
max_indexing_threads = 2

[index]
index = "issues"
type = "issue"

[index.fields.summary]
jira_field = "fields.summary"

[activity_log]
index = "activity"
"#;
        let settings: RiverSettings = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.river_name, "my_river");
        assert_eq!(settings.jira.username.as_deref(), Some("indexer"));
        assert_eq!(settings.jira.max_indexing_threads, 2);
        assert_eq!(settings.issue_index_name(), "issues");
        assert_eq!(settings.index.doc_type, "issue");
        let fields = settings.index.fields.unwrap();
        assert_eq!(fields["summary"].jira_field, "fields.summary");
        assert_eq!(settings.activity_log.unwrap().doc_type, "jira_river_indexupdate");
    }
}
