use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::query::{Filter, Index, OrderBy, Sort, NATURAL_ORDER};
use super::validate::{validate_index, validate_sort};
use super::{Database, DocumentCollection};
use crate::document::{from_document, to_document, DocumentId, ID_FIELD};
use crate::error::StoreError;

/// A named collection of documents of type `T`.
///
/// Values are serialized to documents on the way in and deserialized on
/// the way out. `T` usually carries an optional `_id` field so that read
/// values expose their identifier; it is ignored on writes.
pub struct Collection<T> {
    inner: Arc<dyn DocumentCollection>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(database: &Database, name: &str) -> Result<Self, StoreError> {
        Ok(Self {
            inner: database.collection(name)?,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Every document, in insertion order.
    pub async fn all(&self) -> Result<Vec<T>, StoreError> {
        self.find_where(Filter::new()).await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.inner.count(&Filter::new()).await
    }

    /// Insert `value` under a freshly assigned identifier.
    pub async fn create(&self, value: &T) -> Result<DocumentId, StoreError> {
        let mut document = to_document(value)?;
        let id = DocumentId::new();
        document.insert(ID_FIELD.to_string(), id.to_value());
        self.inner.insert_one(document).await
    }

    pub async fn delete_id(&self, id: DocumentId) -> Result<(), StoreError> {
        self.inner.delete_one(require_id(id)?).await
    }

    pub async fn find_id(&self, id: DocumentId) -> Result<T, StoreError> {
        self.find_one(Filter::by_id(require_id(id)?)).await
    }

    /// First match in insertion order.
    pub async fn find_one(&self, filter: Filter) -> Result<T, StoreError> {
        self.find_single(&filter, Vec::new()).await
    }

    pub async fn first(&self) -> Result<T, StoreError> {
        self.find_single(&Filter::new(), Vec::new()).await
    }

    pub async fn last(&self) -> Result<T, StoreError> {
        self.find_single(&Filter::new(), vec![(NATURAL_ORDER.to_string(), OrderBy::Desc)])
            .await
    }

    /// First match ordered by identifier.
    pub async fn first_inserted(&self, filter: Filter) -> Result<T, StoreError> {
        self.find_single(&filter, vec![(ID_FIELD.to_string(), OrderBy::Asc)])
            .await
    }

    /// Last match ordered by identifier.
    pub async fn last_inserted(&self, filter: Filter) -> Result<T, StoreError> {
        self.find_single(&filter, vec![(ID_FIELD.to_string(), OrderBy::Desc)])
            .await
    }

    /// Overwrite the stored fields of document `id` with those of `value`.
    pub async fn update_id(&self, id: DocumentId, value: &T) -> Result<(), StoreError> {
        let mut fields = to_document(value)?;
        fields.remove(ID_FIELD);
        self.inner.update_one(require_id(id)?, fields).await
    }

    pub async fn find_where(&self, filter: Filter) -> Result<Vec<T>, StoreError> {
        self.find_many(&filter, &Vec::new()).await
    }

    pub async fn find_where_with_order(
        &self,
        filter: Filter,
        sort: Sort,
    ) -> Result<Vec<T>, StoreError> {
        validate_sort(&sort)?;
        self.find_many(&filter, &sort).await
    }

    pub async fn create_unique_index(&self, index: &Index) -> Result<(), StoreError> {
        validate_index(index)?;
        self.inner.create_unique_index(index).await
    }

    pub async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        self.inner.delete_index(name).await
    }

    pub async fn list_indexes(&self) -> Result<Vec<Index>, StoreError> {
        self.inner.list_indexes().await
    }

    pub async fn drop(&self) -> Result<(), StoreError> {
        self.inner.drop_collection().await
    }

    async fn find_single(&self, filter: &Filter, sort: Sort) -> Result<T, StoreError> {
        let document = self
            .inner
            .find(filter, &sort, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::DocumentNotFound)?;
        from_document(document)
    }

    async fn find_many(&self, filter: &Filter, sort: &Sort) -> Result<Vec<T>, StoreError> {
        self.inner
            .find(filter, sort, None)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

fn require_id(id: DocumentId) -> Result<DocumentId, StoreError> {
    if id.is_nil() {
        Err(StoreError::EmptyId)
    } else {
        Ok(id)
    }
}
