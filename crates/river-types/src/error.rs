//! Error types shared across the jira-river crates.

use thiserror::Error;

/// Unified error type for river-level operations.
#[derive(Debug, Error)]
pub enum RiverError {
    /// Configuration error, raised during construction. The service must
    /// not start when one of these is produced.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid IANA timezone identifier
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}
