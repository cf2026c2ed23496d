use thiserror::Error;

/// SQLSTATE raised by PostgreSQL on a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors returned by the document store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection was not initialized")]
    ConnectionNotInitialized,

    #[error("id can not be empty")]
    EmptyId,

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("document not found")]
    DocumentNotFound,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("invalid order parameter: {0}")]
    InvalidOrder(String),

    #[error("settings must be valid: {0}")]
    InvalidSettings(String),

    #[error("can not connect to the database: {0}")]
    CanNotConnect(String),

    #[error("migration failed: {0}")]
    Migration(String),

    /// The change feed dropped events because the subscriber fell behind.
    #[error("change feed lagged, {0} events were skipped")]
    FeedLagged(u64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::DocumentNotFound)
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => StoreError::DocumentNotFound,
            sqlx::Error::PoolClosed => StoreError::ConnectionNotInitialized,
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                StoreError::DuplicateKey
            }
            _ => StoreError::Database(error),
        }
    }
}

/// Errors that terminate a watch loop.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not decode change event: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("could not get id from event document")]
    MissingDocumentId,

    #[error("collection {0} holds the history entries and can not be watched")]
    WatchingHistoryCollection(String),
}
