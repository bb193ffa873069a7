//! Per-project indexing and coordination.
//!
//! The [`ProjectIndexer`] drives one full or incremental sync pass for a
//! single project: a paginated, watermark-bounded pull from the upstream,
//! transformation through the structure builder, bulk writes to the search
//! backend and, on full updates, a sweep-delete of documents that vanished
//! upstream. The [`IndexerCoordinator`] owns project discovery and
//! schedules indexer runs over a bounded worker pool with a slot reserved
//! for incremental work.

pub mod activity;
pub mod coordinator;
pub mod error;
pub mod indexer;
pub mod projects;
pub mod registry;

pub use activity::ActivityLogWriter;
pub use coordinator::{CoordinatorConfig, CoordinatorHandle, IndexerCoordinator};
pub use error::IndexerError;
pub use indexer::{
    IndexerContext, ProjectIndexer, RunOutcome, RunReport, UpdateMode,
    LAST_INDEXED_ISSUE_UPDATE_DATE_PROPERTY,
};
pub use projects::ProjectCatalog;
pub use registry::RiverRegistry;
