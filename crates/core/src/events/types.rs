use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::WatchError;

/// Kind of mutation reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

/// Where a mutation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

/// One record of the change feed, as decoded from its JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub ns: Namespace,
    pub cluster_time: DateTime<Utc>,
    /// Post-mutation state; absent for deletes.
    #[serde(default)]
    pub full_document: Option<Document>,
    pub document_key: Document,
    pub operation_type: OperationType,
}

impl ChangeEvent {
    /// Identifier of the mutated document, read from `documentKey._id`.
    pub fn document_id(&self) -> Result<DocumentId, WatchError> {
        self.document_key
            .get(ID_FIELD)
            .and_then(DocumentId::from_value)
            .ok_or(WatchError::MissingDocumentId)
    }
}
