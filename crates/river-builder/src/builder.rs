//! Declarative issue-to-document structure builder.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use river_search::{BulkOp, SearchHit, StaleDocsQuery};
use river_types::config::{CommentIndexingMode, FieldMapping, IndexSettings};
use river_types::time::parse_iso_datetime;

use crate::error::BuilderError;
use crate::preprocess::IssuePreprocessor;

/// Upstream field holding the issue key.
pub const JF_KEY: &str = "key";
/// Upstream field holding the comment id.
pub const JF_ID: &str = "id";
/// Dotted path to the issue update timestamp.
pub const JF_UPDATED: &str = "fields.updated";
/// Dotted path to the comment array.
pub const JF_COMMENTS: &str = "fields.comment.comments";

const DEFAULT_TEMPLATE: &str = include_str!("../templates/river_configuration_default.json");

/// Follow a dot-notation path through nested JSON objects.
///
/// A missing intermediate key yields `None`; this never fails on shape.
pub fn extract<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Transforms upstream issue records into index documents according to the
/// configured field map, and builds the matching deletion query for full
/// updates.
pub struct IssueIndexStructureBuilder {
    river_name: String,
    index_name: String,
    issue_type: String,
    comment_type: String,
    issue_show_url_base: String,
    fields_config: BTreeMap<String, FieldMapping>,
    filters_config: BTreeMap<String, BTreeMap<String, String>>,
    field_river_name: String,
    field_project_key: String,
    field_issue_key: String,
    field_issue_url: String,
    comment_mode: CommentIndexingMode,
    field_comments: String,
    comment_fields_config: BTreeMap<String, FieldMapping>,
    required_call_fields: Vec<String>,
    preprocessors: Vec<Box<dyn IssuePreprocessor>>,
}

impl std::fmt::Debug for IssueIndexStructureBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueIndexStructureBuilder")
            .field("river_name", &self.river_name)
            .field("index_name", &self.index_name)
            .field("issue_type", &self.issue_type)
            .field("comment_type", &self.comment_type)
            .field("issue_show_url_base", &self.issue_show_url_base)
            .field("fields_config", &self.fields_config)
            .field("filters_config", &self.filters_config)
            .field("field_river_name", &self.field_river_name)
            .field("field_project_key", &self.field_project_key)
            .field("field_issue_key", &self.field_issue_key)
            .field("field_issue_url", &self.field_issue_url)
            .field("comment_mode", &self.comment_mode)
            .field("field_comments", &self.field_comments)
            .field("comment_fields_config", &self.comment_fields_config)
            .field("required_call_fields", &self.required_call_fields)
            .field("preprocessors_count", &self.preprocessors.len())
            .finish()
    }
}

impl IssueIndexStructureBuilder {
    /// Build from the `index.*` settings section, filling absent options
    /// from the embedded default template and validating the result.
    pub fn new(
        river_name: &str,
        index_name: &str,
        jira_url_base: &str,
        settings: &IndexSettings,
    ) -> Result<Self, BuilderError> {
        let defaults: IndexSettings = serde_json::from_str(DEFAULT_TEMPLATE)
            .map_err(|e| BuilderError::Config(format!("embedded default template: {e}")))?;

        let pick = |value: &Option<String>, default: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| default.clone())
                .ok_or_else(|| BuilderError::Config(format!("no '{name}' configuration found")))
        };

        let fields_config = match &settings.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => defaults.fields.clone().unwrap_or_default(),
        };
        let filters_config = match &settings.value_filters {
            Some(filters) if !filters.is_empty() => filters.clone(),
            _ => defaults.value_filters.clone().unwrap_or_default(),
        };
        let comment_fields_config = match &settings.comment_fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => defaults.comment_fields.clone().unwrap_or_default(),
        };

        let comment_mode = CommentIndexingMode::parse_configuration(
            settings
                .comment_mode
                .as_deref()
                .or(defaults.comment_mode.as_deref()),
        )
        .map_err(|e| BuilderError::Config(e.to_string()))?;

        let mut builder = Self {
            river_name: river_name.to_string(),
            index_name: index_name.to_string(),
            issue_type: settings.doc_type.clone(),
            comment_type: settings.comment_type.clone(),
            issue_show_url_base: construct_issue_show_url_base(jira_url_base),
            field_river_name: pick(
                &settings.field_river_name,
                &defaults.field_river_name,
                "index/field_river_name",
            )?,
            field_project_key: pick(
                &settings.field_project_key,
                &defaults.field_project_key,
                "index/field_project_key",
            )?,
            field_issue_key: pick(
                &settings.field_issue_key,
                &defaults.field_issue_key,
                "index/field_issue_key",
            )?,
            field_issue_url: pick(
                &settings.field_issue_url,
                &defaults.field_issue_url,
                "index/field_issue_url",
            )?,
            field_comments: pick(
                &settings.field_comments,
                &defaults.field_comments,
                "index/field_comments",
            )?,
            fields_config,
            filters_config,
            comment_mode,
            comment_fields_config,
            required_call_fields: Vec::new(),
            preprocessors: Vec::new(),
        };

        builder.validate_configuration()?;
        builder.prepare_required_call_fields();
        Ok(builder)
    }

    fn validate_configuration(&self) -> Result<(), BuilderError> {
        if self.fields_config.is_empty() {
            return Err(BuilderError::Config(
                "no 'index/fields' configuration found".into(),
            ));
        }
        if self.comment_fields_config.is_empty() {
            return Err(BuilderError::Config(
                "no 'index/comment_fields' configuration found".into(),
            ));
        }
        self.validate_fields_map(&self.fields_config, "index/fields")?;
        self.validate_fields_map(&self.comment_fields_config, "index/comment_fields")
    }

    fn validate_fields_map(
        &self,
        fields: &BTreeMap<String, FieldMapping>,
        section: &str,
    ) -> Result<(), BuilderError> {
        for (name, mapping) in fields {
            if name.trim().is_empty() {
                return Err(BuilderError::Config(format!(
                    "empty key found in '{section}' map"
                )));
            }
            if mapping.jira_field.trim().is_empty() {
                return Err(BuilderError::Config(format!(
                    "'jira_field' is not defined in '{section}/{name}'"
                )));
            }
            if let Some(filter) = &mapping.value_filter {
                if !self.filters_config.contains_key(filter) {
                    return Err(BuilderError::Config(format!(
                        "filter definition not found for filter name '{filter}' \
                         defined in '{section}/{name}/value_filter'"
                    )));
                }
            }
        }
        Ok(())
    }

    fn prepare_required_call_fields(&mut self) {
        let mut fields: Vec<String> = vec!["updated".to_string(), "project".to_string()];
        for mapping in self.fields_config.values() {
            if let Some(name) = jira_call_field_name(&mapping.jira_field) {
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
        }
        if self.comment_mode.requires_comments() && !fields.contains(&"comment".to_string()) {
            fields.push("comment".to_string());
        }
        self.required_call_fields = fields;
    }

    /// Register a preprocessing stage; stages run in registration order.
    pub fn add_preprocessor(&mut self, preprocessor: Box<dyn IssuePreprocessor>) {
        debug!(stage = preprocessor.name(), "Registered issue preprocessor");
        self.preprocessors.push(preprocessor);
    }

    /// Fields the upstream search call must request, first segment per
    /// configured path plus `updated`, `project` and (when comments are
    /// indexed) `comment`.
    pub fn required_call_fields(&self) -> &[String] {
        &self.required_call_fields
    }

    /// The required fields as the comma-separated form the REST call takes.
    pub fn required_call_fields_csv(&self) -> String {
        self.required_call_fields.join(",")
    }

    /// Search index issue documents of this river are stored in.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Document type for issues.
    pub fn issue_type(&self) -> &str {
        &self.issue_type
    }

    /// Configured comment materialisation mode.
    pub fn comment_mode(&self) -> CommentIndexingMode {
        self.comment_mode
    }

    /// Output field holding the project key, used by the deletion query.
    pub fn project_key_field(&self) -> &str {
        &self.field_project_key
    }

    /// Issue key from an upstream record.
    pub fn extract_issue_key<'a>(&self, issue: &'a Value) -> Option<&'a str> {
        extract(JF_KEY, issue).and_then(Value::as_str)
    }

    /// Update timestamp from an upstream record. `None` when the field is
    /// absent or not a parseable timestamp.
    pub fn extract_issue_updated(&self, issue: &Value) -> Option<DateTime<Utc>> {
        extract(JF_UPDATED, issue)
            .and_then(Value::as_str)
            .and_then(parse_iso_datetime)
    }

    /// Comment id from a comment record.
    pub fn extract_comment_id<'a>(&self, comment: &'a Value) -> Option<&'a str> {
        extract(JF_ID, comment).and_then(Value::as_str)
    }

    /// URL of an issue, or of a focused comment, in the tracker GUI.
    pub fn prepare_gui_url(&self, issue_key: &str, comment_id: Option<&str>) -> String {
        match comment_id {
            None => format!("{}{}", self.issue_show_url_base, issue_key),
            Some(id) => format!(
                "{}{}?focusedCommentId={}&page=com.atlassian.jira.plugin.system.\
                 issuetabpanels:comment-tabpanel#comment-{}",
                self.issue_show_url_base, issue_key, id, id
            ),
        }
    }

    /// Run the preprocessor chain, then append the index operations for one
    /// issue (and its comments, per the configured mode) to the bulk.
    pub fn index_issue(
        &self,
        ops: &mut Vec<BulkOp>,
        project_key: &str,
        issue: &Value,
    ) -> Result<(), BuilderError> {
        let issue = self.preprocess_issue(project_key, issue.clone());
        let issue_key = self
            .extract_issue_key(&issue)
            .ok_or(BuilderError::MissingField("key"))?
            .to_string();

        let document = self.issue_document(project_key, &issue)?;
        ops.push(BulkOp::index(
            self.index_name.clone(),
            self.issue_type.clone(),
            issue_key.clone(),
            document,
        ));

        if self.comment_mode.stores_separate_documents() {
            for comment in self.comments(&issue) {
                let Some(comment_id) = self.extract_comment_id(comment) else {
                    warn!(
                        issue = %issue_key,
                        "Comment without 'id' field, not indexed"
                    );
                    continue;
                };
                let document = self.comment_document(project_key, &issue_key, comment);
                ops.push(BulkOp::Index {
                    index: self.index_name.clone(),
                    doc_type: self.comment_type.clone(),
                    id: comment_id.to_string(),
                    parent: (self.comment_mode == CommentIndexingMode::Child)
                        .then(|| issue_key.clone()),
                    source: document,
                });
            }
        }
        Ok(())
    }

    /// Append the delete operation for a previously indexed document.
    pub fn delete_issue(&self, ops: &mut Vec<BulkOp>, hit: &SearchHit) {
        let doc_type = if hit.doc_type.is_empty() {
            self.issue_type.clone()
        } else {
            hit.doc_type.clone()
        };
        ops.push(BulkOp::delete(self.index_name.clone(), doc_type, hit.id.clone()));
    }

    /// Query selecting this river's documents for a project whose
    /// ingest-timestamp precedes `older_than`, used by the full-update
    /// delete pass.
    pub fn stale_docs_query(&self, project_key: &str, older_than: DateTime<Utc>) -> StaleDocsQuery {
        let mut doc_types = vec![self.issue_type.clone()];
        if self.comment_mode.stores_separate_documents() {
            doc_types.push(self.comment_type.clone());
        }
        StaleDocsQuery {
            doc_types,
            project_field: self.field_project_key.clone(),
            project_key: project_key.to_string(),
            older_than,
        }
    }

    /// Build the flat index document for one issue.
    pub fn issue_document(
        &self,
        project_key: &str,
        issue: &Value,
    ) -> Result<Value, BuilderError> {
        let issue_key = self
            .extract_issue_key(issue)
            .ok_or(BuilderError::MissingField("key"))?;

        let mut out = Map::new();
        out.insert(
            self.field_river_name.clone(),
            Value::String(self.river_name.clone()),
        );
        out.insert(
            self.field_project_key.clone(),
            Value::String(project_key.to_string()),
        );
        out.insert(
            self.field_issue_key.clone(),
            Value::String(issue_key.to_string()),
        );
        out.insert(
            self.field_issue_url.clone(),
            Value::String(self.prepare_gui_url(issue_key, None)),
        );

        for (field_name, mapping) in &self.fields_config {
            self.add_extracted_value(&mut out, field_name, mapping, issue);
        }

        if self.comment_mode == CommentIndexingMode::Embedded {
            let embedded: Vec<Value> = self
                .comments(issue)
                .iter()
                .map(|comment| self.embedded_comment_object(issue_key, comment))
                .collect();
            if !embedded.is_empty() {
                out.insert(self.field_comments.clone(), Value::Array(embedded));
            }
        }

        Ok(Value::Object(out))
    }

    /// Build the document for one comment in `child`/`standalone` modes.
    pub fn comment_document(&self, project_key: &str, issue_key: &str, comment: &Value) -> Value {
        let mut out = Map::new();
        out.insert(
            self.field_river_name.clone(),
            Value::String(self.river_name.clone()),
        );
        out.insert(
            self.field_project_key.clone(),
            Value::String(project_key.to_string()),
        );
        out.insert(
            self.field_issue_key.clone(),
            Value::String(issue_key.to_string()),
        );
        if let Some(comment_id) = self.extract_comment_id(comment) {
            out.insert(
                self.field_issue_url.clone(),
                Value::String(self.prepare_gui_url(issue_key, Some(comment_id))),
            );
        }
        for (field_name, mapping) in &self.comment_fields_config {
            self.add_extracted_value(&mut out, field_name, mapping, comment);
        }
        Value::Object(out)
    }

    fn embedded_comment_object(&self, issue_key: &str, comment: &Value) -> Value {
        let mut out = Map::new();
        if let Some(comment_id) = self.extract_comment_id(comment) {
            out.insert(
                self.field_issue_url.clone(),
                Value::String(self.prepare_gui_url(issue_key, Some(comment_id))),
            );
        }
        for (field_name, mapping) in &self.comment_fields_config {
            self.add_extracted_value(&mut out, field_name, mapping, comment);
        }
        Value::Object(out)
    }

    fn comments<'a>(&self, issue: &'a Value) -> &'a [Value] {
        extract(JF_COMMENTS, issue)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn preprocess_issue(&self, project_key: &str, issue: Value) -> Value {
        self.preprocessors
            .iter()
            .fold(issue, |acc, stage| stage.apply(project_key, acc))
    }

    /// Extract one configured value, apply its filter and add it to the
    /// output. Missing values are omitted, never an error.
    fn add_extracted_value(
        &self,
        out: &mut Map<String, Value>,
        field_name: &str,
        mapping: &FieldMapping,
        values: &Value,
    ) {
        let Some(value) = extract(&mapping.jira_field, values) else {
            return;
        };
        if value.is_null() {
            return;
        }
        let value = match mapping
            .value_filter
            .as_ref()
            .and_then(|name| self.filters_config.get(name))
        {
            Some(filter) if !filter.is_empty() => {
                self.filter_value(&mapping.jira_field, value.clone(), filter)
            }
            _ => value.clone(),
        };
        out.insert(field_name.to_string(), value);
    }

    /// Apply a rename-map filter to an object, or to each object element
    /// of a sequence. Scalars and non-object elements pass through with a
    /// warning.
    fn filter_value(
        &self,
        path: &str,
        value: Value,
        filter: &BTreeMap<String, String>,
    ) -> Value {
        match value {
            Value::Object(map) => remap_object(&map, filter),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => remap_object(&map, filter),
                        other => {
                            warn!(
                                field = path,
                                "Filter defined for array element which is not filterable"
                            );
                            other
                        }
                    })
                    .collect(),
            ),
            other => {
                warn!(field = path, "Filter defined for field which is not filterable");
                other
            }
        }
    }
}

fn remap_object(map: &Map<String, Value>, filter: &BTreeMap<String, String>) -> Value {
    let mut out = Map::new();
    for (from, to) in filter {
        if let Some(value) = map.get(from) {
            if !value.is_null() {
                out.insert(to.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

fn construct_issue_show_url_base(jira_url_base: &str) -> String {
    let mut base = jira_url_base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    base.push_str("browse/");
    base
}

/// Field name for the upstream REST call, derived from a configured dotted
/// path: the first segment after the `fields.` prefix. Paths outside
/// `fields.` contribute nothing to the call field set.
fn jira_call_field_name(full_field_name: &str) -> Option<String> {
    let trimmed = full_field_name.trim();
    let rest = trimmed.strip_prefix("fields.")?;
    let first = rest.split('.').next().unwrap_or_default().trim();
    if first.is_empty() {
        warn!(
            field = trimmed,
            "Bad format of field name, nothing will be requested for it"
        );
        return None;
    }
    Some(first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const RIVER: &str = "my_river";
    const URL_BASE: &str = "https://issues.example.org";

    fn default_builder() -> IssueIndexStructureBuilder {
        IssueIndexStructureBuilder::new(RIVER, "issues", URL_BASE, &IndexSettings::default())
            .unwrap()
    }

    fn builder_with(settings: IndexSettings) -> Result<IssueIndexStructureBuilder, BuilderError> {
        IssueIndexStructureBuilder::new(RIVER, "issues", URL_BASE, &settings)
    }

    fn sample_issue() -> Value {
        json!({
            "key": "ORG-1501",
            "self": "https://issues.example.org/rest/api/2/issue/12345",
            "fields": {
                "updated": "2024-05-01T10:01:00.000+0000",
                "created": "2024-04-01T08:00:00.000+0000",
                "summary": "Something is broken",
                "issuetype": { "name": "Bug", "subtask": false },
                "status": { "name": "Open", "id": "1" },
                "project": { "key": "ORG" },
                "reporter": {
                    "name": "jdoe",
                    "emailAddress": "jdoe@example.org",
                    "displayName": "Jane Doe",
                    "avatarUrls": { "16x16": "https://..." }
                },
                "labels": ["storage", "urgent"],
                "fixVersions": [
                    { "name": "1.0", "released": false },
                    { "name": "1.1", "released": false }
                ],
                "comment": {
                    "comments": [
                        {
                            "id": "9001",
                            "body": "first comment",
                            "author": { "name": "jdoe", "displayName": "Jane Doe" },
                            "created": "2024-04-02T09:00:00.000+0000",
                            "updated": "2024-04-02T09:00:00.000+0000"
                        },
                        {
                            "id": "9002",
                            "body": "second comment",
                            "author": { "name": "asmith", "displayName": "Al Smith" },
                            "created": "2024-04-03T09:00:00.000+0000",
                            "updated": "2024-04-03T09:00:00.000+0000"
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_extract_dotted_path() {
        let issue = sample_issue();
        assert_eq!(
            extract("fields.status.name", &issue),
            Some(&Value::String("Open".into()))
        );
        assert_eq!(extract("key", &issue), Some(&Value::String("ORG-1501".into())));
        // missing intermediate key yields None, not an error
        assert_eq!(extract("fields.nonexistent.name", &issue), None);
        assert_eq!(extract("fields.summary.deeper", &issue), None);
    }

    #[test]
    fn test_defaults_loaded_from_template() {
        let builder = default_builder();
        assert_eq!(builder.field_river_name, "river");
        assert_eq!(builder.field_project_key, "project_key");
        assert_eq!(builder.field_issue_key, "issue_key");
        assert_eq!(builder.field_issue_url, "document_url");
        assert_eq!(builder.comment_mode(), CommentIndexingMode::Embedded);
        assert_eq!(builder.field_comments, "comments");
        assert!(builder.fields_config.contains_key("summary"));
        assert!(builder.filters_config.contains_key("user"));
    }

    #[test]
    fn test_explicit_config_overrides_template() {
        let settings = IndexSettings {
            field_river_name: Some("source".to_string()),
            comment_mode: Some("none".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();
        assert_eq!(builder.field_river_name, "source");
        assert_eq!(builder.comment_mode(), CommentIndexingMode::None);
        // untouched options still come from the template
        assert_eq!(builder.field_project_key, "project_key");
    }

    #[test]
    fn test_validation_missing_jira_field() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "summary".to_string(),
            FieldMapping {
                jira_field: "  ".to_string(),
                value_filter: None,
            },
        );
        let settings = IndexSettings {
            fields: Some(fields),
            ..Default::default()
        };
        assert!(matches!(
            builder_with(settings),
            Err(BuilderError::Config(_))
        ));
    }

    #[test]
    fn test_validation_unknown_value_filter() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "reporter".to_string(),
            FieldMapping {
                jira_field: "fields.reporter".to_string(),
                value_filter: Some("nonexistent".to_string()),
            },
        );
        let settings = IndexSettings {
            fields: Some(fields),
            ..Default::default()
        };
        let err = builder_with(settings).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_validation_blank_field_name() {
        let mut fields = BTreeMap::new();
        fields.insert(
            " ".to_string(),
            FieldMapping {
                jira_field: "fields.summary".to_string(),
                value_filter: None,
            },
        );
        let settings = IndexSettings {
            fields: Some(fields),
            ..Default::default()
        };
        assert!(matches!(
            builder_with(settings),
            Err(BuilderError::Config(_))
        ));
    }

    #[test]
    fn test_required_call_fields() {
        let builder = default_builder();
        let fields = builder.required_call_fields();
        // always requested
        assert!(fields.contains(&"updated".to_string()));
        assert!(fields.contains(&"project".to_string()));
        // first segments of configured paths, deduplicated
        assert!(fields.contains(&"summary".to_string()));
        assert!(fields.contains(&"issuetype".to_string()));
        assert!(fields.contains(&"fixVersions".to_string()));
        // comment mode embedded needs the comment field
        assert!(fields.contains(&"comment".to_string()));
        assert_eq!(
            fields.iter().filter(|f| f.as_str() == "updated").count(),
            1
        );

        let csv = builder.required_call_fields_csv();
        assert!(csv.starts_with("updated,project"));
    }

    #[test]
    fn test_required_call_fields_without_comments() {
        let settings = IndexSettings {
            comment_mode: Some("none".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();
        assert!(!builder
            .required_call_fields()
            .contains(&"comment".to_string()));
    }

    #[test]
    fn test_jira_call_field_name() {
        assert_eq!(
            jira_call_field_name("fields.status.name"),
            Some("status".to_string())
        );
        assert_eq!(
            jira_call_field_name(" fields.summary "),
            Some("summary".to_string())
        );
        assert_eq!(jira_call_field_name("key"), None);
        assert_eq!(jira_call_field_name("fields."), None);
        assert_eq!(jira_call_field_name(""), None);
    }

    #[test]
    fn test_prepare_gui_url() {
        let builder = default_builder();
        assert_eq!(
            builder.prepare_gui_url("ORG-1501", None),
            "https://issues.example.org/browse/ORG-1501"
        );
        assert_eq!(
            builder.prepare_gui_url("ORG-1501", Some("9001")),
            "https://issues.example.org/browse/ORG-1501?focusedCommentId=9001\
             &page=com.atlassian.jira.plugin.system.issuetabpanels:comment-tabpanel#comment-9001"
        );
    }

    #[test]
    fn test_issue_document_provenance_and_fields() {
        let builder = default_builder();
        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();

        assert_eq!(doc["river"], RIVER);
        assert_eq!(doc["project_key"], "ORG");
        assert_eq!(doc["issue_key"], "ORG-1501");
        assert_eq!(
            doc["document_url"],
            "https://issues.example.org/browse/ORG-1501"
        );
        assert_eq!(doc["summary"], "Something is broken");
        assert_eq!(doc["issue_type"], "Bug");
        assert_eq!(doc["status"], "Open");
        assert_eq!(doc["labels"], json!(["storage", "urgent"]));
        // absent upstream value is omitted from the document
        assert!(doc.get("resolutiondate").is_none());
        assert!(doc.get("assignee").is_none());
    }

    #[test]
    fn test_value_filter_on_object() {
        let builder = default_builder();
        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();
        assert_eq!(
            doc["reporter"],
            json!({
                "username": "jdoe",
                "email_address": "jdoe@example.org",
                "display_name": "Jane Doe"
            })
        );
    }

    #[test]
    fn test_value_filter_on_sequence_preserves_order() {
        let builder = default_builder();
        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();
        assert_eq!(
            doc["fix_versions"],
            json!([{ "name": "1.0" }, { "name": "1.1" }])
        );
    }

    #[test]
    fn test_value_filter_on_scalar_passes_through() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "summary".to_string(),
            FieldMapping {
                jira_field: "fields.summary".to_string(),
                value_filter: Some("user".to_string()),
            },
        );
        let settings = IndexSettings {
            fields: Some(fields),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();
        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();
        // scalar with a filter configured: warned and passed through unfiltered
        assert_eq!(doc["summary"], "Something is broken");
    }

    #[test]
    fn test_comment_mode_none_omits_comments() {
        let settings = IndexSettings {
            comment_mode: Some("none".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();

        let mut ops = Vec::new();
        builder.index_issue(&mut ops, "ORG", &sample_issue()).unwrap();
        assert_eq!(ops.len(), 1);

        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();
        assert!(doc.get("comments").is_none());
    }

    #[test]
    fn test_comment_mode_embedded() {
        let builder = default_builder();
        let doc = builder.issue_document("ORG", &sample_issue()).unwrap();
        let comments = doc["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["comment_id"], "9001");
        assert_eq!(comments[0]["comment_body"], "first comment");
        assert_eq!(
            comments[0]["comment_author"],
            json!({ "username": "jdoe", "display_name": "Jane Doe" })
        );
        assert!(comments[0]["document_url"]
            .as_str()
            .unwrap()
            .contains("focusedCommentId=9001"));
        // ordering of the upstream sequence is preserved
        assert_eq!(comments[1]["comment_id"], "9002");

        let mut ops = Vec::new();
        builder.index_issue(&mut ops, "ORG", &sample_issue()).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_comment_mode_child_emits_parented_documents() {
        let settings = IndexSettings {
            comment_mode: Some("child".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();

        let mut ops = Vec::new();
        builder.index_issue(&mut ops, "ORG", &sample_issue()).unwrap();
        assert_eq!(ops.len(), 3);

        match &ops[1] {
            BulkOp::Index {
                doc_type,
                id,
                parent,
                source,
                ..
            } => {
                assert_eq!(doc_type, "jira_issue_comment");
                assert_eq!(id, "9001");
                assert_eq!(parent.as_deref(), Some("ORG-1501"));
                assert_eq!(source["project_key"], "ORG");
                assert_eq!(source["issue_key"], "ORG-1501");
                assert_eq!(source["comment_body"], "first comment");
            }
            other => panic!("expected comment index op, got {other:?}"),
        }
        // issue document carries no embedded array in child mode
        match &ops[0] {
            BulkOp::Index { source, .. } => assert!(source.get("comments").is_none()),
            other => panic!("expected issue index op, got {other:?}"),
        }
    }

    #[test]
    fn test_comment_mode_standalone_has_no_parent() {
        let settings = IndexSettings {
            comment_mode: Some("standalone".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();

        let mut ops = Vec::new();
        builder.index_issue(&mut ops, "ORG", &sample_issue()).unwrap();
        assert_eq!(ops.len(), 3);
        match &ops[1] {
            BulkOp::Index { parent, .. } => assert!(parent.is_none()),
            other => panic!("expected comment index op, got {other:?}"),
        }
    }

    #[test]
    fn test_index_issue_missing_key_fails() {
        let builder = default_builder();
        let mut ops = Vec::new();
        let err = builder
            .index_issue(&mut ops, "ORG", &json!({ "fields": {} }))
            .unwrap_err();
        assert!(matches!(err, BuilderError::MissingField("key")));
    }

    #[test]
    fn test_preprocessor_chain_applied_in_order() {
        struct AppendTag(&'static str);
        impl IssuePreprocessor for AppendTag {
            fn name(&self) -> &str {
                self.0
            }
            fn apply(&self, _project_key: &str, mut issue: Value) -> Value {
                let summary = issue
                    .pointer("/fields/summary")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                issue["fields"]["summary"] = Value::String(format!("{summary}{}", self.0));
                issue
            }
        }

        let mut builder = default_builder();
        builder.add_preprocessor(Box::new(AppendTag(" [a]")));
        builder.add_preprocessor(Box::new(AppendTag(" [b]")));

        let mut ops = Vec::new();
        builder.index_issue(&mut ops, "ORG", &sample_issue()).unwrap();
        match &ops[0] {
            BulkOp::Index { source, .. } => {
                assert_eq!(source["summary"], "Something is broken [a] [b]");
            }
            other => panic!("expected index op, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_issue_updated() {
        let builder = default_builder();
        let updated = builder.extract_issue_updated(&sample_issue()).unwrap();
        assert_eq!(
            updated,
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 10, 1, 0).unwrap()
        );
        assert!(builder.extract_issue_updated(&json!({})).is_none());
        assert!(builder
            .extract_issue_updated(&json!({ "fields": { "updated": "garbage" } }))
            .is_none());
    }

    #[test]
    fn test_stale_docs_query_types() {
        let bound = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let builder = default_builder();
        let query = builder.stale_docs_query("ORG", bound);
        assert_eq!(query.doc_types, vec!["jira_issue".to_string()]);
        assert_eq!(query.project_field, "project_key");
        assert_eq!(query.project_key, "ORG");
        assert_eq!(query.older_than, bound);

        let settings = IndexSettings {
            comment_mode: Some("child".to_string()),
            ..Default::default()
        };
        let builder = builder_with(settings).unwrap();
        assert_eq!(
            builder.stale_docs_query("ORG", bound).doc_types,
            vec!["jira_issue".to_string(), "jira_issue_comment".to_string()]
        );
    }

    #[test]
    fn test_delete_issue_uses_hit_type() {
        let builder = default_builder();
        let mut ops = Vec::new();
        builder.delete_issue(
            &mut ops,
            &SearchHit {
                id: "9001".to_string(),
                doc_type: "jira_issue_comment".to_string(),
            },
        );
        builder.delete_issue(
            &mut ops,
            &SearchHit {
                id: "ORG-1".to_string(),
                doc_type: String::new(),
            },
        );
        assert_eq!(
            ops[0],
            BulkOp::delete("issues", "jira_issue_comment", "9001")
        );
        assert_eq!(ops[1], BulkOp::delete("issues", "jira_issue", "ORG-1"));
    }
}
