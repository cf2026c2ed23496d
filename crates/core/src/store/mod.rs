//! Document store abstraction.
//!
//! A [`Database`] is a cheap, cloneable handle over a [`Backend`]. Backends
//! hand out [`DocumentCollection`]s working on raw [`Document`]s and open
//! change streams over all of their collections at once. The typed
//! [`Collection`] wrapper sits on top and is what application code uses.

pub mod collection;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod validate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{Document, DocumentId};
use crate::error::StoreError;
use crate::events::stream::ChangeStream;

pub use collection::Collection;
pub use memory::MemoryBackend;
pub use postgres::{ConnectionSettings, PostgresBackend};
pub use query::{Filter, Index, OrderBy, Sort, NATURAL_ORDER};

/// Untyped operations over one named collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a document carrying its `_id`.
    async fn insert_one(&self, document: Document) -> Result<DocumentId, StoreError>;

    /// Matching documents, ordered by `sort` (insertion order when empty).
    async fn find(
        &self,
        filter: &Filter,
        sort: &Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Overwrite the given top-level fields of a document.
    async fn update_one(&self, id: DocumentId, fields: Document) -> Result<(), StoreError>;

    async fn delete_one(&self, id: DocumentId) -> Result<(), StoreError>;

    async fn create_unique_index(&self, index: &Index) -> Result<(), StoreError>;

    async fn delete_index(&self, name: &str) -> Result<(), StoreError>;

    async fn list_indexes(&self) -> Result<Vec<Index>, StoreError>;

    /// Remove every document and index. Emits no change events.
    async fn drop_collection(&self) -> Result<(), StoreError>;
}

/// A document database: named collections plus one change feed.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the database, reported in change events.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Round trip to the server.
    async fn ping(&self) -> Result<(), StoreError>;

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;

    /// Open an ordered change stream covering every collection.
    async fn watch(&self) -> Result<Box<dyn ChangeStream>, StoreError>;
}

/// Handle to a document database. The default handle is not connected to
/// anything and every operation on it fails with
/// [`StoreError::ConnectionNotInitialized`].
#[derive(Clone, Default)]
pub struct Database {
    backend: Option<Arc<dyn Backend>>,
}

impl Database {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A database held entirely in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryBackend::new(name)))
    }

    /// Connect to PostgreSQL and verify the connection.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, StoreError> {
        let backend = PostgresBackend::connect(settings).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// The backend, provided it is connected.
    pub fn backend(&self) -> Result<&Arc<dyn Backend>, StoreError> {
        match &self.backend {
            Some(backend) if backend.is_connected() => Ok(backend),
            _ => Err(StoreError::ConnectionNotInitialized),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.backend().map(|_| ())
    }

    pub fn name(&self) -> Option<&str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn collection(&self, name: &str) -> Result<Arc<dyn DocumentCollection>, StoreError> {
        Ok(self.backend()?.collection(name))
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend()?.ping().await
    }

    pub async fn watch(&self) -> Result<Box<dyn ChangeStream>, StoreError> {
        self.backend()?.watch().await
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name())
            .field("connected", &self.validate().is_ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_database_is_not_initialized() {
        let database = Database::default();
        assert!(matches!(
            database.validate(),
            Err(StoreError::ConnectionNotInitialized)
        ));
        assert!(database.collection("movies").is_err());
    }

    #[tokio::test]
    async fn ping_reaches_the_backend() {
        assert!(Database::in_memory("app").ping().await.is_ok());
        assert!(Database::default().ping().await.is_err());
    }

    #[test]
    fn closed_backend_is_not_initialized() {
        let backend = Arc::new(MemoryBackend::new("app"));
        let database = Database::new(backend.clone());
        assert!(database.validate().is_ok());

        backend.close();

        assert!(matches!(
            database.validate(),
            Err(StoreError::ConnectionNotInitialized)
        ));
    }
}
