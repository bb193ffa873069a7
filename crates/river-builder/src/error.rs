//! Error types for the document builder.

use thiserror::Error;

/// Errors raised by [`crate::IssueIndexStructureBuilder`].
#[derive(Debug, Error)]
pub enum BuilderError {
    /// Invalid field/filter configuration, detected at construction.
    #[error("index structure configuration invalid: {0}")]
    Config(String),

    /// An issue record lacked a field the transformation cannot proceed
    /// without.
    #[error("issue record is missing required field '{0}'")]
    MissingField(&'static str),
}
