//! HTTP adapter for Elasticsearch-compatible search backends.
//!
//! Documents are stamped with an ingest timestamp at write time so the
//! stale-document sweep can filter on it without any backend-side mapping
//! support.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use river_types::time::format_iso_datetime;

use crate::backend::{BulkOp, ScrollCursor, SearchBackend, SearchHit, StaleDocsQuery};
use crate::error::BackendError;

/// Field stamped into every indexed document at write time.
pub const INGEST_TIMESTAMP_FIELD: &str = "_ingest_ts";

const SCROLL_KEEPALIVE: &str = "1m";

/// Search backend reachable over an Elasticsearch-style REST API.
pub struct HttpSearchBackend {
    client: Client,
    base_url: String,
}

impl HttpSearchBackend {
    /// Create an adapter for the given base URL.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(response: reqwest::Response) -> Result<Value, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Response(e.to_string()))
    }

    fn parse_scroll_page(body: &Value) -> Result<(Option<String>, Vec<SearchHit>), BackendError> {
        let scroll_id = body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| BackendError::Response("missing hits in scroll response".into()))?
            .iter()
            .map(|hit| {
                let id = hit
                    .get("_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BackendError::Response("hit without _id".into()))?;
                let doc_type = hit.get("_type").and_then(Value::as_str).unwrap_or_default();
                Ok(SearchHit {
                    id: id.to_string(),
                    doc_type: doc_type.to_string(),
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        Ok((scroll_id, hits))
    }
}

/// Stamp the ingest timestamp into a document source.
fn stamp_ingest_timestamp(mut source: Value) -> Value {
    if let Some(obj) = source.as_object_mut() {
        obj.insert(
            INGEST_TIMESTAMP_FIELD.to_string(),
            Value::String(format_iso_datetime(Utc::now())),
        );
    }
    source
}

/// Serialize bulk operations into the newline-delimited bulk body.
fn build_bulk_body(ops: Vec<BulkOp>) -> Result<String, BackendError> {
    let mut body = String::new();
    for op in ops {
        match op {
            BulkOp::Index {
                index,
                doc_type,
                id,
                parent,
                source,
            } => {
                let mut action = json!({ "_index": index, "_type": doc_type, "_id": id });
                if let Some(parent) = parent {
                    action["parent"] = Value::String(parent);
                }
                body.push_str(&json!({ "index": action }).to_string());
                body.push('\n');
                body.push_str(&stamp_ingest_timestamp(source).to_string());
                body.push('\n');
            }
            BulkOp::Delete {
                index,
                doc_type,
                id,
            } => {
                body.push_str(
                    &json!({ "delete": { "_index": index, "_type": doc_type, "_id": id } })
                        .to_string(),
                );
                body.push('\n');
            }
        }
    }
    Ok(body)
}

/// Translate a [`StaleDocsQuery`] into the search DSL.
fn build_stale_docs_body(query: &StaleDocsQuery, page_size: usize) -> Value {
    json!({
        "size": page_size,
        "_source": false,
        "query": {
            "bool": {
                "filter": [
                    { "terms": { "_type": query.doc_types } },
                    { "term": { (query.project_field.as_str()): query.project_key } },
                    { "range": { (INGEST_TIMESTAMP_FIELD): { "lt": format_iso_datetime(query.older_than) } } }
                ]
            }
        }
    })
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn bulk(&self, ops: Vec<BulkOp>) -> Result<(), BackendError> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        let body = build_bulk_body(ops)?;
        let response = self
            .client
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let parsed = Self::check_status(response).await?;
        if parsed.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let failures: Vec<String> = parsed
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            item.as_object()
                                .and_then(|ops| ops.values().next())
                                .and_then(|op| op.get("error"))
                                .map(|e| e.to_string())
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Err(BackendError::Bulk(failures.join("; ")));
        }
        debug!(operations = count, "Executed bulk request");
        Ok(())
    }

    async fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<Option<Value>, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("{index}/{doc_type}/{id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed = Self::check_status(response).await?;
        Ok(parsed.get("_source").cloned())
    }

    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: Value,
    ) -> Result<(), BackendError> {
        let response = self
            .client
            .put(self.url(&format!("{index}/{doc_type}/{id}")))
            .json(&stamp_ingest_timestamp(source))
            .send()
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn delete_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<bool, BackendError> {
        let response = self
            .client
            .delete(self.url(&format!("{index}/{doc_type}/{id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check_status(response).await.map(|_| true)
    }

    async fn refresh(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url(&format!("{index}/_refresh")))
            .send()
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn scroll_stale_docs(
        &self,
        index: &str,
        query: StaleDocsQuery,
        page_size: usize,
    ) -> Result<Box<dyn ScrollCursor>, BackendError> {
        let body = build_stale_docs_body(&query, page_size);
        let response = self
            .client
            .post(self.url(&format!("{index}/_search?scroll={SCROLL_KEEPALIVE}")))
            .json(&body)
            .send()
            .await?;
        let parsed = Self::check_status(response).await?;
        let (scroll_id, first_page) = Self::parse_scroll_page(&parsed)?;
        Ok(Box::new(HttpScrollCursor {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            scroll_id,
            first_page: Some(first_page),
        }))
    }
}

struct HttpScrollCursor {
    client: Client,
    base_url: String,
    scroll_id: Option<String>,
    first_page: Option<Vec<SearchHit>>,
}

#[async_trait]
impl ScrollCursor for HttpScrollCursor {
    async fn next_page(&mut self) -> Result<Vec<SearchHit>, BackendError> {
        if let Some(first) = self.first_page.take() {
            return Ok(first);
        }
        let Some(scroll_id) = self.scroll_id.clone() else {
            return Ok(Vec::new());
        };
        let response = self
            .client
            .post(format!("{}/_search/scroll", self.base_url))
            .json(&json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id }))
            .send()
            .await?;
        let parsed = HttpSearchBackend::check_status(response).await?;
        let (next_id, hits) = HttpSearchBackend::parse_scroll_page(&parsed)?;
        self.scroll_id = next_id;
        Ok(hits)
    }
}
