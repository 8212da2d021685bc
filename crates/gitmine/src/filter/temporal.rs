//! Temporal windowing of commit records by committer date.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::harvest::{HarvestEnvelope, json_type};
use crate::storage::DocumentStore;

use super::{
    FilterError, FilterOutcome, RecordError, Result, flatten_records, items_of, load, skip,
};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FIELD: &str = "commit.committer.date";

/// Output order of windowed commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitOrder {
    /// Page order, then array order within each page.
    #[default]
    Traversal,
    /// Ascending committer date; ties keep traversal order.
    Chronological,
}

/// An open interval `(after, before)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        Self { after, before }
    }

    /// Parse both bounds with [`parse_instant`].
    pub fn parse(after: &str, before: &str) -> Result<Self> {
        let parse = |value: &str| {
            parse_instant(value).ok_or_else(|| FilterError::InvalidBound {
                value: value.to_string(),
            })
        };
        Ok(Self::new(parse(after)?, parse(before)?))
    }

    /// Strictly after the lower bound and strictly before the upper bound.
    #[inline]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.after < instant && instant < self.before
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less `yyyy-MM-ddTHH:mm:ss`
/// timestamp taken as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, NAIVE_FORMAT)
                .ok()
                .map(|t| t.and_utc())
        })
}

fn committer_date(index: usize, record: &Value) -> std::result::Result<DateTime<Utc>, RecordError> {
    if !record.is_object() {
        return Err(RecordError::NotAnObject {
            index,
            found: json_type(record),
        });
    }

    let raw = record
        .pointer("/commit/committer/date")
        .ok_or(RecordError::MissingField {
            index,
            field: DATE_FIELD,
        })?;
    let text = raw.as_str().ok_or_else(|| RecordError::InvalidField {
        index,
        field: DATE_FIELD,
        value: raw.to_string(),
    })?;

    parse_instant(text).ok_or_else(|| RecordError::InvalidField {
        index,
        field: DATE_FIELD,
        value: text.to_string(),
    })
}

/// Keep the commits whose committer date falls inside `window`.
///
/// The output `items` is always a flat array.
pub fn filter_commits_by_window(
    document: &Value,
    window: &TimeWindow,
    order: CommitOrder,
) -> Result<FilterOutcome<Value>> {
    let items = items_of(document)?;
    let mut kept: Vec<(DateTime<Utc>, Value)> = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in flatten_records(items).into_iter().enumerate() {
        match committer_date(index, record) {
            Ok(date) if window.contains(date) => kept.push((date, record.clone())),
            Ok(_) => {}
            Err(error) => skip(&mut skipped, error),
        }
    }

    if order == CommitOrder::Chronological {
        kept.sort_by_key(|(date, _)| *date);
    }

    tracing::debug!(
        kept = kept.len(),
        skipped = skipped.len(),
        after = %window.after,
        before = %window.before,
        "Filtered commits by window"
    );

    let records = kept.into_iter().map(|(_, record)| record).collect();
    Ok(FilterOutcome {
        value: HarvestEnvelope::from_items(records).into_document(),
        skipped,
    })
}

/// Load `source`, window it, and write the result to `out_dir/filename`.
pub fn filter_commits_file(
    store: &dyn DocumentStore,
    source: &Path,
    window: &TimeWindow,
    order: CommitOrder,
    out_dir: &Path,
    filename: &str,
) -> Result<FilterOutcome<PathBuf>> {
    let document = load(store, source)?;
    let FilterOutcome { value, skipped } = filter_commits_by_window(&document, window, order)?;
    let path = store.write_document(&value, out_dir, filename)?;

    Ok(FilterOutcome {
        value: path,
        skipped,
    })
}
