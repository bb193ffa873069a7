//! Shared types for the jira-river service.
//!
//! Holds the layered configuration (`RiverSettings`), the unified
//! `RiverError` type, and minute-precision time helpers used by the
//! incremental update windowing.

pub mod config;
pub mod error;
pub mod time;

pub use config::{
    ActivityLogSettings, CommentIndexingMode, FieldMapping, IndexSettings, JiraSettings,
    RiverSettings, SearchSettings,
};
pub use error::RiverError;
