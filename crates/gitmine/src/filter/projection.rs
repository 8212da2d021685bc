//! Field projection: keep only selected top-level fields of each record.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::harvest::{HarvestEnvelope, json_type};
use crate::storage::DocumentStore;

use super::{FilterOutcome, RecordError, Result, flatten_records, items_of, load, skip};

/// Project every record of `document` onto `fields`.
///
/// Each output record contains exactly those requested fields present on
/// the source record, in request order. Projecting a projection yields
/// the same document.
pub fn project_fields<S: AsRef<str>>(
    document: &Value,
    fields: &[S],
) -> Result<FilterOutcome<Value>> {
    let items = items_of(document)?;
    let mut projected = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in flatten_records(items).into_iter().enumerate() {
        let Some(object) = record.as_object() else {
            skip(
                &mut skipped,
                RecordError::NotAnObject {
                    index,
                    found: json_type(record),
                },
            );
            continue;
        };

        let mut out = Map::new();
        for field in fields {
            let field = field.as_ref();
            if let Some(value) = object.get(field) {
                out.insert(field.to_string(), value.clone());
            }
        }
        projected.push(Value::Object(out));
    }

    tracing::debug!(
        records = projected.len(),
        skipped = skipped.len(),
        "Projected fields"
    );

    Ok(FilterOutcome {
        value: HarvestEnvelope::from_items(projected).into_document(),
        skipped,
    })
}

/// Load `source`, project it, and write the result to `out_dir/filename`.
pub fn project_file<S: AsRef<str>>(
    store: &dyn DocumentStore,
    source: &Path,
    fields: &[S],
    out_dir: &Path,
    filename: &str,
) -> Result<FilterOutcome<PathBuf>> {
    let document = load(store, source)?;
    let FilterOutcome { value, skipped } = project_fields(&document, fields)?;
    let path = store.write_document(&value, out_dir, filename)?;

    Ok(FilterOutcome {
        value: path,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterError;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_projects_requested_fields() {
        let document = json!({"items": [
            {"name": "spring-boot", "stargazers_count": 70000, "forks": 40000},
            {"name": "spring-framework", "forks": 38000}
        ]});

        let outcome = project_fields(&document, &["name", "stargazers_count"]).unwrap();

        assert_eq!(
            outcome.value,
            json!({"items": [
                {"name": "spring-boot", "stargazers_count": 70000},
                {"name": "spring-framework"}
            ]})
        );
        assert_eq!(outcome.skipped_count(), 0);
    }

    #[test]
    fn test_projection_is_idempotent() {
        let document = json!({"items": [{"a": 1, "b": 2, "c": 3}, {"b": 5}]});
        let once = project_fields(&document, &["a", "b"]).unwrap().value;
        let twice = project_fields(&once, &["a", "b"]).unwrap().value;
        assert_eq!(once, twice);
    }

    #[test]
    fn test_single_resource_is_one_record() {
        let document = json!({"items": {"name": "spring-boot", "tags_url": "https://api.github.com/repos/s/b/tags", "id": 1}});
        let outcome = project_fields(&document, &["tags_url"]).unwrap();
        assert_eq!(
            outcome.value,
            json!({"items": [{"tags_url": "https://api.github.com/repos/s/b/tags"}]})
        );
    }

    #[test]
    fn test_non_object_records_are_skipped() {
        let document = json!({"items": [{"name": "x"}, "oops", 3]});
        let outcome = project_fields(&document, &["name"]).unwrap();
        assert_eq!(outcome.value, json!({"items": [{"name": "x"}]}));
        assert_eq!(
            outcome.skipped,
            vec![
                RecordError::NotAnObject { index: 1, found: "string" },
                RecordError::NotAnObject { index: 2, found: "number" },
            ]
        );
    }

    #[test]
    fn test_empty_field_list_keeps_empty_records() {
        let document = json!({"items": [{"a": 1}]});
        let outcome = project_fields::<&str>(&document, &[]).unwrap();
        assert_eq!(outcome.value, json!({"items": [{}]}));
    }

    #[test]
    fn test_missing_items() {
        let err = project_fields(&json!({"total": 0}), &["a"]).unwrap_err();
        assert!(matches!(err, FilterError::MissingItems));
    }

    #[test]
    fn test_project_file_writes_new_document() {
        let store = MemoryStore::new();
        let source = json!({"items": [{"name": "a", "id": 1}]});
        store.insert("in/repos.json", source.clone());

        let outcome = project_file(
            &store,
            Path::new("in/repos.json"),
            &["name"],
            Path::new("out"),
            "repos_filtered.json",
        )
        .unwrap();

        assert_eq!(outcome.value, PathBuf::from("out/repos_filtered.json"));
        assert_eq!(
            store.get("out/repos_filtered.json"),
            Some(json!({"items": [{"name": "a"}]}))
        );
        assert_eq!(store.get("in/repos.json"), Some(source));
    }

    #[test]
    fn test_project_file_missing_source() {
        let store = MemoryStore::new();
        let err = project_file(
            &store,
            Path::new("nope.json"),
            &["name"],
            Path::new("out"),
            "x.json",
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::NotFound { .. }));
        assert!(store.writes().is_empty());
    }
}
