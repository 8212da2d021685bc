//! The `{"items": ...}` accumulation container and its merge disciplines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How an endpoint's pages are merged into the envelope.
///
/// The caller picks the shape; it is never inferred from response content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointShape {
    /// One logical object; every page overwrites `items` (last page wins).
    SingleResource,
    /// A list endpoint whose records are appended flat to `items`.
    ///
    /// Pages may be bare arrays or search envelopes carrying their own
    /// `items` array.
    CollectionOfRecords,
    /// A list endpoint whose page arrays are appended as one element each,
    /// so `items` becomes a sequence of pages.
    CollectionOfPages,
}

impl EndpointShape {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointShape::SingleResource => "single",
            EndpointShape::CollectionOfRecords => "records",
            EndpointShape::CollectionOfPages => "pages",
        }
    }
}

impl fmt::Display for EndpointShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(EndpointShape::SingleResource),
            "records" => Ok(EndpointShape::CollectionOfRecords),
            "pages" => Ok(EndpointShape::CollectionOfPages),
            other => Err(format!(
                "unknown endpoint shape '{other}' (expected single, records or pages)"
            )),
        }
    }
}

/// A page body did not have the JSON type its endpoint shape requires.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected {expected} for {shape} endpoint, got {found}")]
pub struct ShapeMismatch {
    pub shape: EndpointShape,
    pub expected: &'static str,
    pub found: &'static str,
}

/// The canonical `{"items": [...]}` wrapper for harvested and filtered documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestEnvelope {
    pub items: Value,
}

impl Default for HarvestEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestEnvelope {
    /// An envelope with an empty `items` array.
    pub fn new() -> Self {
        Self {
            items: Value::Array(Vec::new()),
        }
    }

    /// Wrap a list of values.
    pub fn from_items(items: Vec<Value>) -> Self {
        Self {
            items: Value::Array(items),
        }
    }

    /// Take the `items` member of a stored document, if it has one.
    pub fn from_document(document: Value) -> Option<Self> {
        match document {
            Value::Object(mut map) => map.remove("items").map(|items| Self { items }),
            _ => None,
        }
    }

    /// The JSON document to persist.
    pub fn to_document(&self) -> Value {
        serde_json::json!({ "items": self.items })
    }

    pub fn into_document(self) -> Value {
        serde_json::json!({ "items": self.items })
    }

    /// Number of top-level entries in `items` (an object counts as one).
    pub fn len(&self) -> usize {
        match &self.items {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge one page body according to `shape`.
    pub fn merge(&mut self, shape: EndpointShape, page: Value) -> Result<(), ShapeMismatch> {
        match shape {
            EndpointShape::SingleResource => {
                if !page.is_object() {
                    return Err(mismatch(shape, "object", &page));
                }
                self.items = page;
            }
            EndpointShape::CollectionOfPages => {
                if !page.is_array() {
                    return Err(mismatch(shape, "array", &page));
                }
                self.items_mut().push(page);
            }
            EndpointShape::CollectionOfRecords => {
                let records = match page {
                    Value::Array(records) => records,
                    Value::Object(mut map) => match map.remove("items") {
                        Some(Value::Array(records)) => records,
                        _ => {
                            return Err(ShapeMismatch {
                                shape,
                                expected: "array or object with an items array",
                                found: "object",
                            });
                        }
                    },
                    other => return Err(mismatch(shape, "array", &other)),
                };
                self.items_mut().extend(records);
            }
        }

        Ok(())
    }

    fn items_mut(&mut self) -> &mut Vec<Value> {
        if !self.items.is_array() {
            self.items = Value::Array(Vec::new());
        }
        match &mut self.items {
            Value::Array(items) => items,
            _ => unreachable!("items was just replaced with an array"),
        }
    }
}

fn mismatch(shape: EndpointShape, expected: &'static str, found: &Value) -> ShapeMismatch {
    ShapeMismatch {
        shape,
        expected,
        found: json_type(found),
    }
}

/// Name of a JSON value's type, for error messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
