//! In-memory search backend.
//!
//! Behaves like the HTTP adapter for the subset of the contract the
//! indexing pipeline uses: stable-id upserts, ingest timestamps stamped at
//! write time, and the stale-document scroll. Used by tests and local
//! experiments; also offers a few inspection helpers and failure switches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backend::{BulkOp, ScrollCursor, SearchBackend, SearchHit, StaleDocsQuery};
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct StoredDoc {
    doc_type: String,
    parent: Option<String>,
    source: Value,
    ingest_ts: DateTime<Utc>,
}

/// In-memory [`SearchBackend`] implementation.
#[derive(Default)]
pub struct InMemoryBackend {
    indices: Mutex<HashMap<String, HashMap<String, StoredDoc>>>,
    bulk_executions: AtomicUsize,
    indexed_ops: AtomicUsize,
    refresh_calls: AtomicUsize,
    fail_bulk: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_op(&self, op: BulkOp) {
        let mut indices = self.indices.lock().unwrap();
        match op {
            BulkOp::Index {
                index,
                doc_type,
                id,
                parent,
                source,
            } => {
                indices.entry(index).or_default().insert(
                    id,
                    StoredDoc {
                        doc_type,
                        parent,
                        source,
                        ingest_ts: Utc::now(),
                    },
                );
                self.indexed_ops.fetch_add(1, Ordering::SeqCst);
            }
            BulkOp::Delete { index, id, .. } => {
                if let Some(docs) = indices.get_mut(&index) {
                    docs.remove(&id);
                }
            }
        }
    }

    /// Make the next bulk execution fail, to exercise failure handling.
    pub fn fail_next_bulk(&self) {
        self.fail_bulk.store(true, Ordering::SeqCst);
    }

    /// Number of executed bulk requests.
    pub fn bulk_executions(&self) -> usize {
        self.bulk_executions.load(Ordering::SeqCst)
    }

    /// Number of index operations applied (bulk and single-document).
    pub fn indexed_ops(&self) -> usize {
        self.indexed_ops.load(Ordering::SeqCst)
    }

    /// Number of refresh calls observed.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Fetch a stored document source for inspection.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.source.clone())
    }

    /// Parent id recorded for a stored document.
    pub fn document_parent(&self, index: &str, id: &str) -> Option<String> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .and_then(|docs| docs.get(id))
            .and_then(|doc| doc.parent.clone())
    }

    /// Number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// All document ids in an index, unordered.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Backdate a stored document's ingest timestamp.
    pub fn set_ingest_timestamp(&self, index: &str, id: &str, ts: DateTime<Utc>) {
        let mut indices = self.indices.lock().unwrap();
        if let Some(doc) = indices.get_mut(index).and_then(|docs| docs.get_mut(id)) {
            doc.ingest_ts = ts;
        }
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn bulk(&self, ops: Vec<BulkOp>) -> Result<(), BackendError> {
        if self.fail_bulk.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Bulk("injected bulk failure".into()));
        }
        self.bulk_executions.fetch_add(1, Ordering::SeqCst);
        for op in ops {
            self.apply_op(op);
        }
        Ok(())
    }

    async fn get_document(
        &self,
        index: &str,
        _doc_type: &str,
        id: &str,
    ) -> Result<Option<Value>, BackendError> {
        Ok(self.document(index, id))
    }

    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: Value,
    ) -> Result<(), BackendError> {
        self.apply_op(BulkOp::index(index, doc_type, id, source));
        Ok(())
    }

    async fn delete_document(
        &self,
        index: &str,
        _doc_type: &str,
        id: &str,
    ) -> Result<bool, BackendError> {
        let mut indices = self.indices.lock().unwrap();
        Ok(indices
            .get_mut(index)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn refresh(&self, _index: &str) -> Result<(), BackendError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scroll_stale_docs(
        &self,
        index: &str,
        query: StaleDocsQuery,
        page_size: usize,
    ) -> Result<Box<dyn ScrollCursor>, BackendError> {
        let indices = self.indices.lock().unwrap();
        let mut hits: Vec<SearchHit> = indices
            .get(index)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| {
                        query.doc_types.contains(&doc.doc_type)
                            && doc
                                .source
                                .get(&query.project_field)
                                .and_then(Value::as_str)
                                .is_some_and(|key| key == query.project_key)
                            && doc.ingest_ts < query.older_than
                    })
                    .map(|(id, doc)| SearchHit {
                        id: id.clone(),
                        doc_type: doc.doc_type.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| a.id.cmp(&b.id));

        let pages: Vec<Vec<SearchHit>> = hits
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Ok(Box::new(InMemoryScrollCursor { pages, next: 0 }))
    }
}

struct InMemoryScrollCursor {
    pages: Vec<Vec<SearchHit>>,
    next: usize,
}

#[async_trait]
impl ScrollCursor for InMemoryScrollCursor {
    async fn next_page(&mut self) -> Result<Vec<SearchHit>, BackendError> {
        let page = self.pages.get(self.next).cloned().unwrap_or_default();
        self.next += 1;
        Ok(page)
    }
}
