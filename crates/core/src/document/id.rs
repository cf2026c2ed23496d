//! Document identifier utilities.
//!
//! Identifiers are time-ordered UUIDs (v7) assigned by the store on insert,
//! so ordering by `_id` follows insertion order. They are stored in
//! documents as their hyphenated string form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh identifier. Identifiers from one process sort in
    /// generation order.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// The all-zero identifier never names a stored document.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Read an identifier out of a document value, as found under `_id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(StoreError::EmptyId);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| StoreError::InvalidId(format!("{s:?}: {e}")))
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
