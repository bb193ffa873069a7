//! Issue-to-document transformation.
//!
//! Pure mapping from the upstream's nested issue JSON to the flat index
//! document shape, driven by a declarative field/filter configuration with
//! an embedded default template. Also derives the set of fields the
//! upstream call must request and constructs the stale-document query used
//! by the full-update delete pass.

pub mod builder;
pub mod error;
pub mod preprocess;

pub use builder::{extract, IssueIndexStructureBuilder};
pub use error::BuilderError;
pub use preprocess::IssuePreprocessor;
