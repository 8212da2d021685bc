//! Title extraction for issues carrying a given label.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::harvest::json_type;
use crate::storage::{self, DocumentStore};

use super::{FilterOutcome, RecordError, Result, flatten_records, items_of, load, skip};

pub const DEFAULT_BUG_LABEL: &str = "type-bug";

/// Whether an issue's `labels` value matches `target`.
///
/// An array of labels matches when any label name (a string, or an
/// object's `name`) contains `target`. Any other value falls back to a
/// substring test against its serialized JSON.
pub fn label_matches(labels: &Value, target: &str) -> bool {
    match labels {
        Value::Array(labels) => labels.iter().any(|label| {
            let name = match label {
                Value::String(name) => Some(name.as_str()),
                Value::Object(object) => object.get("name").and_then(Value::as_str),
                _ => None,
            };
            name.is_some_and(|name| name.contains(target))
        }),
        other => other.to_string().contains(target),
    }
}

/// Titles of the issues labelled `label`, in traversal order.
pub fn extract_titles(document: &Value, label: &str) -> Result<FilterOutcome<Vec<String>>> {
    let items = items_of(document)?;
    let mut titles = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in flatten_records(items).into_iter().enumerate() {
        let Some(issue) = record.as_object() else {
            skip(
                &mut skipped,
                RecordError::NotAnObject {
                    index,
                    found: json_type(record),
                },
            );
            continue;
        };

        let Some(labels) = issue.get("labels") else {
            skip(&mut skipped, RecordError::MissingField { index, field: "labels" });
            continue;
        };
        if !label_matches(labels, label) {
            continue;
        }

        match issue.get("title") {
            Some(Value::String(title)) => titles.push(title.clone()),
            Some(other) => skip(
                &mut skipped,
                RecordError::InvalidField {
                    index,
                    field: "title",
                    value: other.to_string(),
                },
            ),
            None => skip(&mut skipped, RecordError::MissingField { index, field: "title" }),
        }
    }

    tracing::debug!(
        label,
        titles = titles.len(),
        skipped = skipped.len(),
        "Extracted issue titles"
    );

    Ok(FilterOutcome {
        value: titles,
        skipped,
    })
}

/// Write one title per line.
pub fn write_titles<S: AsRef<str>>(titles: &[S], path: &Path) -> Result<PathBuf> {
    Ok(storage::write_lines(titles, path)?)
}

/// Load `source`, extract titles labelled `label`, and write them to `out`.
pub fn extract_titles_file(
    store: &dyn DocumentStore,
    source: &Path,
    label: &str,
    out: &Path,
) -> Result<FilterOutcome<PathBuf>> {
    let document = load(store, source)?;
    let FilterOutcome { value, skipped } = extract_titles(&document, label)?;
    let path = write_titles(&value, out)?;

    Ok(FilterOutcome {
        value: path,
        skipped,
    })
}
