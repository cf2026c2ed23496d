//! In-memory backend.
//!
//! Collections live in process memory and every mutation is published on
//! an [`EventBus`] in the same JSON shape the PostgreSQL feed produces.
//! Useful for tests and for embedding the watcher without a server.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::trace;

use super::query::{Filter, Index, OrderBy, Sort, NATURAL_ORDER};
use super::{Backend, DocumentCollection};
use crate::document::{
    canonical_string, document_id, get_path, values_equal, Document, DocumentId, ID_FIELD,
};
use crate::error::StoreError;
use crate::events::bus::{EventBus, DEFAULT_FEED_CAPACITY};
use crate::events::stream::{BusStream, ChangeStream};
use crate::events::types::{ChangeEvent, Namespace, OperationType};

/// State shared by the backend and all of its collections.
struct Shared {
    name: String,
    connected: AtomicBool,
    bus: EventBus,
    /// Last cluster time handed out. Locked while publishing so that feed
    /// order and cluster time order agree.
    clock: Mutex<DateTime<Utc>>,
}

impl Shared {
    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(AtomicOrdering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::ConnectionNotInitialized)
        }
    }

    fn emit(
        &self,
        collection: &str,
        operation_type: OperationType,
        id: DocumentId,
        full_document: Option<Document>,
    ) -> Result<(), StoreError> {
        let mut clock = self.clock.lock();
        let now = Utc::now();
        let cluster_time = if now > *clock {
            now
        } else {
            *clock + TimeDelta::microseconds(1)
        };
        *clock = cluster_time;

        let mut document_key = Document::new();
        document_key.insert(ID_FIELD.to_string(), id.to_value());
        let event = ChangeEvent {
            ns: Namespace {
                db: self.name.clone(),
                coll: collection.to_string(),
            },
            cluster_time,
            full_document,
            document_key,
            operation_type,
        };
        let receivers = self.bus.publish(serde_json::to_value(&event)?);
        trace!(collection, %id, op = operation_type.as_str(), receivers, "published change event");
        Ok(())
    }
}

/// A document database held in memory.
pub struct MemoryBackend {
    shared: Arc<Shared>,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_feed_capacity(name, DEFAULT_FEED_CAPACITY)
    }

    /// Create a backend whose change feed buffers at most `capacity`
    /// records per subscriber before reporting lag.
    pub fn with_feed_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                connected: AtomicBool::new(true),
                bus: EventBus::new(capacity),
                clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
            }),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Disconnect. Every later operation fails with
    /// [`StoreError::ConnectionNotInitialized`].
    pub fn close(&self) {
        self.shared.connected.store(false, AtomicOrdering::Release);
    }

    /// Publish a raw record on the change feed as if a mutation had
    /// produced it. Returns the number of subscribers reached.
    pub fn inject_event(&self, record: Value) -> usize {
        self.shared.bus.publish(record)
    }

    /// Number of open change streams.
    pub fn subscriber_count(&self) -> usize {
        self.shared.bus.subscriber_count()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(AtomicOrdering::Acquire)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.shared.ensure_connected()
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        if let Some(collection) = self.collections.read().get(name) {
            return collection.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    shared: self.shared.clone(),
                    state: RwLock::new(CollectionState::default()),
                })
            })
            .clone()
    }

    async fn watch(&self) -> Result<Box<dyn ChangeStream>, StoreError> {
        self.shared.ensure_connected()?;
        Ok(Box::new(BusStream::new(self.shared.bus.subscribe())))
    }
}

#[derive(Default)]
struct CollectionState {
    /// Documents in insertion order.
    documents: Vec<Document>,
    indexes: Vec<Index>,
}

impl CollectionState {
    fn position(&self, id: DocumentId) -> Option<usize> {
        self.documents
            .iter()
            .position(|document| document_id(document) == Some(id))
    }

    /// Whether `candidate` collides with any document other than the one at
    /// `skip` on the identifier or a unique index.
    fn violates_uniqueness(&self, candidate: &Document, skip: Option<usize>) -> bool {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, document)| document);
        let id = document_id(candidate);
        for other in others {
            if id.is_some() && document_id(other) == id {
                return true;
            }
            if self
                .indexes
                .iter()
                .any(|index| same_keys(index, candidate, other))
            {
                return true;
            }
        }
        false
    }
}

/// Null or missing key values never conflict.
fn same_keys(index: &Index, left: &Document, right: &Document) -> bool {
    let left = index.key_values(left);
    let right = index.key_values(right);
    if left.iter().chain(right.iter()).any(Value::is_null) {
        return false;
    }
    left.iter().zip(right.iter()).all(|(l, r)| values_equal(l, r))
}

struct MemoryCollection {
    name: String,
    shared: Arc<Shared>,
    state: RwLock<CollectionState>,
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> Result<DocumentId, StoreError> {
        self.shared.ensure_connected()?;
        let id = document_id(&document).ok_or(StoreError::EmptyId)?;
        let mut state = self.state.write();
        if state.violates_uniqueness(&document, None) {
            return Err(StoreError::DuplicateKey);
        }
        state.documents.push(document.clone());
        self.shared
            .emit(&self.name, OperationType::Insert, id, Some(document))?;
        Ok(id)
    }

    async fn find(
        &self,
        filter: &Filter,
        sort: &Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        self.shared.ensure_connected()?;
        let state = self.state.read();
        let mut matches: Vec<(usize, &Document)> = state
            .documents
            .iter()
            .enumerate()
            .filter(|(_, document)| filter.matches(document))
            .collect();
        if !sort.is_empty() {
            matches.sort_by(|left, right| compare_by(sort, *left, *right));
        }
        let limit = limit.unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|(_, document)| document.clone())
            .collect())
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.shared.ensure_connected()?;
        let state = self.state.read();
        Ok(state
            .documents
            .iter()
            .filter(|document| filter.matches(document))
            .count() as u64)
    }

    async fn update_one(&self, id: DocumentId, fields: Document) -> Result<(), StoreError> {
        self.shared.ensure_connected()?;
        let mut state = self.state.write();
        let position = state.position(id).ok_or(StoreError::DocumentNotFound)?;
        let mut updated = state.documents[position].clone();
        for (key, value) in fields {
            if key != ID_FIELD {
                updated.insert(key, value);
            }
        }
        if state.violates_uniqueness(&updated, Some(position)) {
            return Err(StoreError::DuplicateKey);
        }
        state.documents[position] = updated.clone();
        self.shared
            .emit(&self.name, OperationType::Update, id, Some(updated))
    }

    async fn delete_one(&self, id: DocumentId) -> Result<(), StoreError> {
        self.shared.ensure_connected()?;
        let mut state = self.state.write();
        let position = state.position(id).ok_or(StoreError::DocumentNotFound)?;
        state.documents.remove(position);
        self.shared.emit(&self.name, OperationType::Delete, id, None)
    }

    async fn create_unique_index(&self, index: &Index) -> Result<(), StoreError> {
        self.shared.ensure_connected()?;
        let mut state = self.state.write();
        if let Some(existing) = state.indexes.iter().find(|i| i.name == index.name) {
            return if existing.keys == index.keys {
                Ok(())
            } else {
                Err(StoreError::InvalidIndex(format!(
                    "an index named {} already exists with different keys",
                    index.name
                )))
            };
        }
        let documents = &state.documents;
        for (position, document) in documents.iter().enumerate() {
            if documents[position + 1..]
                .iter()
                .any(|other| same_keys(index, document, other))
            {
                return Err(StoreError::DuplicateKey);
            }
        }
        state.indexes.push(index.clone());
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        self.shared.ensure_connected()?;
        let mut state = self.state.write();
        let position = state
            .indexes
            .iter()
            .position(|index| index.name == name)
            .ok_or_else(|| StoreError::IndexNotFound(name.to_string()))?;
        state.indexes.remove(position);
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<Index>, StoreError> {
        self.shared.ensure_connected()?;
        Ok(self.state.read().indexes.clone())
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        self.shared.ensure_connected()?;
        let mut state = self.state.write();
        state.documents.clear();
        state.indexes.clear();
        Ok(())
    }
}

fn compare_by(sort: &Sort, left: (usize, &Document), right: (usize, &Document)) -> Ordering {
    for (key, order) in sort {
        let ordering = if key == NATURAL_ORDER {
            left.0.cmp(&right.0)
        } else {
            compare_values(get_path(left.1, key), get_path(right.1, key))
        };
        let ordering = match order {
            OrderBy::Asc => ordering,
            OrderBy::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Total order over values: missing and null first, then numbers,
/// strings, documents, lists and booleans.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (left, right) {
        (Some(Value::Number(l)), Some(Value::Number(r))) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => {
                let (l, r) = (l.as_f64().unwrap_or(f64::NAN), r.as_f64().unwrap_or(f64::NAN));
                l.partial_cmp(&r).unwrap_or(Ordering::Equal)
            }
        },
        (Some(Value::String(l)), Some(Value::String(r))) => l.cmp(r),
        (Some(Value::Bool(l)), Some(Value::Bool(r))) => l.cmp(r),
        (Some(l @ Value::Object(_)), Some(r @ Value::Object(_)))
        | (Some(l @ Value::Array(_)), Some(r @ Value::Array(_))) => {
            canonical_string(l).cmp(&canonical_string(r))
        }
        _ => rank(left).cmp(&rank(right)),
    }
}
