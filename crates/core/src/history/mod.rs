//! Change history: one immutable [`History`] entry per observed mutation.

pub mod diff;
pub mod recorder;
pub mod watcher;

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::document::{Document, DocumentId};
use crate::events::types::OperationType;

pub use recorder::Recorder;
pub use watcher::Watcher;

/// Field of a [`History`] entry holding the mutated document's id.
pub const OBJECT_ID_FIELD: &str = "object_id";

/// Field of a [`History`] entry holding the feed's cluster time.
pub const CREATED_AT_FIELD: &str = "created_at";

/// One recorded mutation of a watched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    /// Cluster time of the change event. Stored with a fixed number of
    /// fractional digits so that the text form sorts chronologically.
    #[serde(with = "sortable_time")]
    pub created_at: DateTime<Utc>,
    pub collection_name: String,
    pub object_id: DocumentId,
    /// Full state of the document after the mutation. Empty for deletes.
    #[serde(default)]
    pub modified: Document,
    /// Leaves that differ from the previous entry of the same document,
    /// keyed by dotted path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub updated_fields: BTreeMap<String, UpdatedField>,
    pub action: OperationType,
}

/// Both sides of a changed leaf. `None` means the field was absent on that
/// side, which is not the same as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatedField {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

impl UpdatedField {
    pub fn new(old: Option<Value>, new: Option<Value>) -> Self {
        Self { old, new }
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key
/// becomes `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

mod sortable_time {
    use super::*;

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_null_differs_from_absent() {
        let field: UpdatedField = serde_json::from_value(json!({"old": null})).unwrap();
        assert_eq!(field, UpdatedField::new(Some(Value::Null), None));
        assert_eq!(serde_json::to_value(&field).unwrap(), json!({"old": null}));
    }

    #[test]
    fn stores_snake_case_fields() {
        let entry = History {
            id: None,
            created_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            collection_name: "movies".into(),
            object_id: DocumentId::new(),
            modified: Document::new(),
            updated_fields: BTreeMap::new(),
            action: OperationType::Insert,
        };
        let value = serde_json::to_value(&entry).unwrap();
        let stored = value.as_object().unwrap();
        assert!(stored.contains_key(OBJECT_ID_FIELD));
        assert!(stored.contains_key(CREATED_AT_FIELD));
        assert!(!stored.contains_key("_id"));
        assert!(!stored.contains_key("updated_fields"));
        assert_eq!(stored["action"], json!("insert"));
        assert_eq!(
            stored[CREATED_AT_FIELD],
            json!("2024-05-01T10:00:00.000000000Z")
        );

        let back: History = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
