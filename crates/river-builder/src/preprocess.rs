//! Issue preprocessing stages.
//!
//! Preprocessors are transformation stages applied in registration order
//! to each upstream issue record before field extraction. Stages cannot
//! register further stages, so the chain is a plain ordered sequence.

use serde_json::Value;

/// One transformation stage over an upstream issue record.
pub trait IssuePreprocessor: Send + Sync {
    /// Stage name, used in logs.
    fn name(&self) -> &str;

    /// Transform the issue record. Stages that do not apply to a record
    /// return it unchanged.
    fn apply(&self, project_key: &str, issue: Value) -> Value;
}
