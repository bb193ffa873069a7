//! Persistent per-project datetime values.
//!
//! Small key-value store layered over the search backend, used to keep the
//! "last indexed issue update date" watermark across restarts. Values live
//! in a private index under the document id `_<property>_<project>`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use river_types::time::{format_iso_datetime, parse_iso_datetime};

use crate::backend::{BulkOp, SearchBackend};
use crate::error::BackendError;

/// Field in the stored document that carries the value itself.
const STORE_FIELD_VALUE: &str = "value";

/// Store for per-project datetime properties.
pub struct DatetimeStore {
    backend: Arc<dyn SearchBackend>,
    index: String,
    doc_type: String,
}

impl DatetimeStore {
    /// Create a store writing into the given private index; the river name
    /// is used as the document type so several rivers can share the index.
    pub fn new(backend: Arc<dyn SearchBackend>, index: impl Into<String>, river_name: impl Into<String>) -> Self {
        Self {
            backend,
            index: index.into(),
            doc_type: river_name.into(),
        }
    }

    /// Document id for a stored property value.
    pub fn value_document_id(project_key: &str, property_name: &str) -> String {
        format!("_{property_name}_{project_key}")
    }

    /// Store a datetime value for a project.
    ///
    /// When `bulk` is supplied the write is appended to it and executed by
    /// the caller together with the rest of the batch; otherwise it is
    /// written synchronously.
    pub async fn store_datetime_value(
        &self,
        project_key: &str,
        property_name: &str,
        value: DateTime<Utc>,
        bulk: Option<&mut Vec<BulkOp>>,
    ) -> Result<(), BackendError> {
        let id = Self::value_document_id(project_key, property_name);
        debug!(
            property = property_name,
            project = project_key,
            value = %format_iso_datetime(value),
            mode = if bulk.is_some() { "bulk" } else { "direct" },
            document = %id,
            "Storing datetime value"
        );
        let source = self.build_value_document(project_key, property_name, value);
        match bulk {
            Some(ops) => {
                ops.push(BulkOp::index(
                    self.index.clone(),
                    self.doc_type.clone(),
                    id,
                    source,
                ));
                Ok(())
            }
            None => {
                self.backend
                    .index_document(&self.index, &self.doc_type, &id, source)
                    .await
            }
        }
    }

    /// Read a stored datetime value, `None` when never written.
    ///
    /// The private index is refreshed first so writes from a previous run
    /// are always visible.
    pub async fn read_datetime_value(
        &self,
        project_key: &str,
        property_name: &str,
    ) -> Result<Option<DateTime<Utc>>, BackendError> {
        let id = Self::value_document_id(project_key, property_name);
        self.backend.refresh(&self.index).await?;
        let doc = self
            .backend
            .get_document(&self.index, &self.doc_type, &id)
            .await?;
        match doc {
            None => {
                debug!(document = %id, "No stored datetime value");
                Ok(None)
            }
            Some(doc) => match doc.get(STORE_FIELD_VALUE).and_then(Value::as_str) {
                None => Ok(None),
                Some(raw) => parse_iso_datetime(raw)
                    .map(Some)
                    .ok_or_else(|| {
                        BackendError::Response(format!(
                            "stored datetime value '{raw}' in {id} is not a valid timestamp"
                        ))
                    }),
            },
        }
    }

    /// Delete a stored datetime value; returns whether it existed.
    pub async fn delete_datetime_value(
        &self,
        project_key: &str,
        property_name: &str,
    ) -> Result<bool, BackendError> {
        let id = Self::value_document_id(project_key, property_name);
        self.backend.refresh(&self.index).await?;
        self.backend
            .delete_document(&self.index, &self.doc_type, &id)
            .await
    }

    fn build_value_document(
        &self,
        project_key: &str,
        property_name: &str,
        value: DateTime<Utc>,
    ) -> Value {
        json!({
            "projectKey": project_key,
            "propertyName": property_name,
            (STORE_FIELD_VALUE): format_iso_datetime(value),
        })
    }
}
