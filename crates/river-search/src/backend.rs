//! Search backend contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::BackendError;

/// One operation inside a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    /// Index (create or replace) a document under a stable id.
    Index {
        index: String,
        doc_type: String,
        id: String,
        /// Parent document id, used for child-comment documents.
        parent: Option<String>,
        source: Value,
    },
    /// Delete a document by id.
    Delete {
        index: String,
        doc_type: String,
        id: String,
    },
}

impl BulkOp {
    /// Convenience constructor for an index operation without a parent.
    pub fn index(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        source: Value,
    ) -> Self {
        BulkOp::Index {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            parent: None,
            source,
        }
    }

    /// Convenience constructor for a delete operation.
    pub fn delete(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        BulkOp::Delete {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }
}

/// A hit returned by the stale-document scroll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub doc_type: String,
}

/// Selects all documents of the given types for one project whose
/// ingest-timestamp is older than a bound. Used by the full-update delete
/// pass to sweep documents that were not re-ingested during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleDocsQuery {
    /// Document types to consider (issue type, plus the comment type when
    /// comments are stored as separate documents).
    pub doc_types: Vec<String>,

    /// Name of the output field holding the project key.
    pub project_field: String,

    /// Project key the sweep is scoped to.
    pub project_key: String,

    /// Documents ingested strictly before this instant match.
    pub older_than: DateTime<Utc>,
}

/// Cursor over the pages of a scrolling search.
#[async_trait]
pub trait ScrollCursor: Send {
    /// Fetch the next page of hits; an empty page ends the scroll.
    async fn next_page(&mut self) -> Result<Vec<SearchHit>, BackendError>;
}

/// Contract towards the document store.
///
/// Implementations stamp every indexed document with an ingest timestamp
/// on write; [`StaleDocsQuery`] filters on that timestamp.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Execute a bulk request. Fails if any operation in it fails.
    async fn bulk(&self, ops: Vec<BulkOp>) -> Result<(), BackendError>;

    /// Read a single document source, `None` when absent.
    async fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<Option<Value>, BackendError>;

    /// Write a single document synchronously.
    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: Value,
    ) -> Result<(), BackendError>;

    /// Delete a single document; returns whether it existed.
    async fn delete_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<bool, BackendError>;

    /// Make previous writes to the index visible to searches.
    async fn refresh(&self, index: &str) -> Result<(), BackendError>;

    /// Open a scrolling search over documents matching the query.
    async fn scroll_stale_docs(
        &self,
        index: &str,
        query: StaleDocsQuery,
        page_size: usize,
    ) -> Result<Box<dyn ScrollCursor>, BackendError>;
}
