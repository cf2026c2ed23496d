//! Filters, orderings and index definitions accepted by collections.
//!
//! Filters are conjunctions of equality tests on dotted field paths. That
//! is all the history watcher and the typed collection need; richer
//! predicates belong to the backend's own query language.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{
    get_path, values_equal, Document, DocumentId, ID_FIELD, PATH_SEPARATOR,
};

/// Sort key selecting insertion order.
pub const NATURAL_ORDER: &str = "$natural";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn sql(&self) -> &'static str {
        match self {
            OrderBy::Asc => " ASC",
            OrderBy::Desc => " DESC",
        }
    }
}

/// Ordered list of sort keys; earlier keys take precedence.
pub type Sort = Vec<(String, OrderBy)>;

/// Equality filter over dotted paths. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: DocumentId) -> Self {
        Self::new().equals(ID_FIELD, id.to_value())
    }

    /// Require the field at `path` to equal `value`.
    pub fn equals(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `document` satisfies every condition. A missing field is
    /// treated as `null`.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            let actual = get_path(document, path).unwrap_or(&Value::Null);
            values_equal(actual, expected)
        })
    }

    /// The filter as a nested document, e.g. `a.b = 1` becomes
    /// `{"a": {"b": 1}}`. Used for containment queries.
    pub fn to_document(&self) -> Document {
        let mut root = Document::new();
        for (path, value) in &self.conditions {
            let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
            insert_nested(&mut root, &segments, value.clone());
        }
        root
    }
}

fn insert_nested(map: &mut Document, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

/// A unique index over one or more field paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub keys: Vec<(String, OrderBy)>,
}

impl Index {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    pub fn key(mut self, path: impl Into<String>, order: OrderBy) -> Self {
        self.keys.push((path.into(), order));
        self
    }

    /// The values this index keys `document` on, `null` for missing fields.
    pub fn key_values(&self, document: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|(path, _)| get_path(document, path).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
