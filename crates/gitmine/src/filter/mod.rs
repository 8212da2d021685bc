//! Offline filters over harvested `{"items": ...}` documents.
//!
//! Every filter reads a document, never mutates it, and produces a new
//! value. Records that cannot be interpreted are skipped, logged and
//! reported in [`FilterOutcome::skipped`]; only document-level problems
//! (missing file, no `items`, bad bounds) are errors.

pub mod issues;
pub mod projection;
pub mod temporal;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::storage::{DocumentStore, StorageError};

pub use issues::{DEFAULT_BUG_LABEL, extract_titles, extract_titles_file, label_matches, write_titles};
pub use projection::{project_fields, project_file};
pub use temporal::{
    CommitOrder, TimeWindow, filter_commits_by_window, filter_commits_file, parse_instant,
};

/// Document-level filter failures.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The source document could not be read or parsed.
    #[error("cannot load {}: {reason}", path.display())]
    NotFound { path: PathBuf, reason: String },

    #[error("document has no \"items\" member")]
    MissingItems,

    #[error("invalid time bound {value:?} (expected e.g. 2019-01-01T00:00:00 or 2019-01-01T00:00:00Z)")]
    InvalidBound { value: String },

    /// Writing the filtered output failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// A single record that a filter could not interpret.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {index} is a {found}, not an object")]
    NotAnObject { index: usize, found: &'static str },

    #[error("record {index} has no {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index} has an invalid {field}: {value}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// A filter result together with the records that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome<T> {
    pub value: T,
    pub skipped: Vec<RecordError>,
}

impl<T> FilterOutcome<T> {
    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// The `items` member of a document.
pub(crate) fn items_of(document: &Value) -> Result<&Value> {
    document.get("items").ok_or(FilterError::MissingItems)
}

/// Flatten `items` into a record sequence.
///
/// Page-of-pages arrays are concatenated in page order; a non-array element
/// counts as one record, and an object-valued `items` is a single record.
pub(crate) fn flatten_records(items: &Value) -> Vec<&Value> {
    match items {
        Value::Array(elements) => elements
            .iter()
            .flat_map(|element| match element {
                Value::Array(page) => page.iter().collect::<Vec<_>>(),
                record => vec![record],
            })
            .collect(),
        Value::Null => Vec::new(),
        record => vec![record],
    }
}

/// Record a skipped record and log it.
pub(crate) fn skip(skipped: &mut Vec<RecordError>, error: RecordError) {
    tracing::warn!(%error, "Skipping record");
    skipped.push(error);
}

/// Load a source document, mapping every failure to [`FilterError::NotFound`].
pub(crate) fn load(store: &dyn DocumentStore, path: &Path) -> Result<Value> {
    store
        .read_document(path)
        .map_err(|e| FilterError::NotFound {
            path: path.to_path_buf(),
            reason: match e {
                StorageError::Io { source, .. } => source.to_string(),
                StorageError::Json { source, .. } => format!("invalid JSON: {source}"),
            },
        })
}
