use std::sync::Arc;
use std::time::Duration;

use doclake_core::document::DocumentId;
use doclake_core::error::{StoreError, WatchError};
use doclake_core::events::types::OperationType;
use doclake_core::history::{History, Watcher, CREATED_AT_FIELD, OBJECT_ID_FIELD};
use doclake_core::store::{Collection, Database, Filter, Index, MemoryBackend, OrderBy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Movie {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
}

impl Movie {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            year: None,
        }
    }
}

struct Harness {
    backend: Arc<MemoryBackend>,
    database: Database,
    history: Collection<History>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), WatchError>>,
}

impl Harness {
    /// Start a watcher over `collections` and wait until it is subscribed.
    async fn start(collections: &'static [&'static str]) -> Self {
        let backend = Arc::new(MemoryBackend::new("app"));
        let database = Database::new(backend.clone());
        let (watcher, history) = Watcher::new(&database, "history").unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { watcher.watch(token, collections).await });

        wait_until(|| {
            let backend = backend.clone();
            async move { backend.subscriber_count() > 0 }
        })
        .await;

        Self {
            backend,
            database,
            history,
            cancel,
            task,
        }
    }

    fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Serialize + serde::de::DeserializeOwned + Send + Sync,
    {
        Collection::new(&self.database, name).unwrap()
    }

    async fn wait_for_entries(&self, expected: u64) {
        let history = self.history.clone();
        wait_until(move || {
            let history = history.clone();
            async move { history.count().await.unwrap() >= expected }
        })
        .await;
    }

    /// Cancel the watch and check that it let go of the feed.
    async fn stop(self) -> Result<(), WatchError> {
        self.cancel.cancel();
        let outcome = self.task.await.unwrap();
        assert_eq!(self.backend.subscriber_count(), 0);
        outcome
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn records_insert_then_update_of_a_movie() {
    let harness = Harness::start(&["movies"]).await;
    let movies = harness.collection::<Movie>("movies");

    let id = movies.create(&Movie::new("Star Wars")).await.unwrap();
    harness.wait_for_entries(1).await;
    movies
        .update_id(id, &Movie::new("Star Wars: Episode IV"))
        .await
        .unwrap();
    harness.wait_for_entries(2).await;

    let entries = harness
        .history
        .find_where_with_order(
            Filter::new().equals(OBJECT_ID_FIELD, id.to_value()),
            vec![(CREATED_AT_FIELD.to_string(), OrderBy::Asc)],
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].action, OperationType::Insert);
    assert_eq!(entries[0].collection_name, "movies");
    assert!(entries[0].updated_fields.is_empty());

    assert_eq!(entries[1].action, OperationType::Update);
    assert_eq!(entries[1].updated_fields.len(), 1);
    let name = &entries[1].updated_fields["name"];
    assert_eq!(name.old, Some(json!("Star Wars")));
    assert_eq!(name.new, Some(json!("Star Wars: Episode IV")));
    assert!(!entries[1].updated_fields.contains_key("_id"));

    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn ignores_collections_that_are_not_watched() {
    let harness = Harness::start(&["watched"]).await;
    let not_watched = harness.collection::<Movie>("not_watched");
    let watched = harness.collection::<Movie>("watched");

    not_watched.create(&Movie::new("Heat")).await.unwrap();
    // Anything recorded for the first insert would land before this one.
    watched.create(&Movie::new("Ronin")).await.unwrap();
    harness.wait_for_entries(1).await;

    let entries = harness.history.all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].collection_name, "watched");

    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn unwatched_mutations_leave_history_empty() {
    let harness = Harness::start(&["watched"]).await;
    let not_watched = harness.collection::<Movie>("not_watched");

    let id = not_watched.create(&Movie::new("Heat")).await.unwrap();
    not_watched.delete_id(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.history.count().await.unwrap(), 0);
    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn snapshots_replay_every_state_of_a_document() {
    let harness = Harness::start(&["movies"]).await;
    let movies = harness.collection::<Movie>("movies");

    let mut states = Vec::new();
    let mut movie = Movie::new("Alien");
    let id = movies.create(&movie).await.unwrap();
    states.push(movies.find_id(id).await.unwrap());
    for year in [1979, 1980, 1986] {
        movie.year = Some(year);
        movies.update_id(id, &movie).await.unwrap();
        states.push(movies.find_id(id).await.unwrap());
    }
    movies.delete_id(id).await.unwrap();
    harness.wait_for_entries(5).await;

    let entries = harness
        .history
        .find_where_with_order(
            Filter::new().equals(OBJECT_ID_FIELD, id.to_value()),
            vec![(CREATED_AT_FIELD.to_string(), OrderBy::Asc)],
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);

    let replayed: Vec<Movie> = entries[..4]
        .iter()
        .map(|entry| serde_json::from_value(Value::Object(entry.modified.clone())).unwrap())
        .collect();
    assert_eq!(replayed, states);
    assert_eq!(entries[4].action, OperationType::Delete);
    assert!(entries[4].modified.is_empty());
    assert!(entries.windows(2).all(|pair| pair[0].created_at < pair[1].created_at));

    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn duplicate_delivery_records_once_with_unique_index() {
    let harness = Harness::start(&["movies"]).await;
    harness
        .history
        .create_unique_index(
            &Index::new("object_id_created_at")
                .key(OBJECT_ID_FIELD, OrderBy::Asc)
                .key(CREATED_AT_FIELD, OrderBy::Asc),
        )
        .await
        .unwrap();

    let id = DocumentId::new();
    let record = json!({
        "ns": {"db": "app", "coll": "movies"},
        "clusterTime": "2024-05-01T10:00:00Z",
        "fullDocument": {"_id": id.to_string(), "name": "Alien"},
        "documentKey": {"_id": id.to_string()},
        "operationType": "insert"
    });
    harness.backend.inject_event(record.clone());
    harness.backend.inject_event(record);

    let marker = harness.collection::<Movie>("movies");
    marker.create(&Movie::new("Heat")).await.unwrap();
    harness.wait_for_entries(2).await;

    let copies = harness
        .history
        .find_where(Filter::new().equals(OBJECT_ID_FIELD, id.to_value()))
        .await
        .unwrap();
    assert_eq!(copies.len(), 1);
    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn duplicate_delivery_without_index_records_twice() {
    let harness = Harness::start(&["movies"]).await;

    let id = DocumentId::new();
    let record = json!({
        "ns": {"db": "app", "coll": "movies"},
        "clusterTime": "2024-05-01T10:00:00Z",
        "fullDocument": {"_id": id.to_string(), "name": "Alien"},
        "documentKey": {"_id": id.to_string()},
        "operationType": "insert"
    });
    harness.backend.inject_event(record.clone());
    harness.backend.inject_event(record);
    harness.wait_for_entries(2).await;

    let copies = harness
        .history
        .find_where(Filter::new().equals(OBJECT_ID_FIELD, id.to_value()))
        .await
        .unwrap();
    assert_eq!(copies.len(), 2);
    assert!(copies[1].updated_fields.is_empty());
    assert!(harness.stop().await.is_ok());
}

#[tokio::test]
async fn malformed_record_aborts_the_watch() {
    let harness = Harness::start(&["movies"]).await;

    harness.backend.inject_event(json!({"operationType": "insert"}));

    let outcome = harness.task.await.unwrap();
    assert!(matches!(outcome, Err(WatchError::Decode(_))));
    assert_eq!(harness.backend.subscriber_count(), 0);
}

#[tokio::test]
async fn missing_document_id_aborts_the_watch() {
    let harness = Harness::start(&["movies"]).await;

    harness.backend.inject_event(json!({
        "ns": {"db": "app", "coll": "movies"},
        "clusterTime": "2024-05-01T10:00:00Z",
        "fullDocument": {"name": "Alien"},
        "documentKey": {},
        "operationType": "insert"
    }));

    let outcome = harness.task.await.unwrap();
    assert!(matches!(outcome, Err(WatchError::MissingDocumentId)));
    assert_eq!(harness.backend.subscriber_count(), 0);
}

#[tokio::test]
async fn backend_failure_during_lookup_aborts_the_watch() {
    let harness = Harness::start(&["movies"]).await;

    harness.backend.close();
    let id = DocumentId::new();
    harness.backend.inject_event(json!({
        "ns": {"db": "app", "coll": "movies"},
        "clusterTime": "2024-05-01T10:00:00Z",
        "fullDocument": {"_id": id.to_string(), "name": "Alien"},
        "documentKey": {"_id": id.to_string()},
        "operationType": "insert"
    }));

    let outcome = harness.task.await.unwrap();
    assert!(matches!(
        outcome,
        Err(WatchError::Store(StoreError::ConnectionNotInitialized))
    ));
    assert_eq!(harness.backend.subscriber_count(), 0);
}

#[tokio::test]
async fn lagging_behind_the_feed_aborts_the_watch() {
    let backend = Arc::new(MemoryBackend::with_feed_capacity("app", 1));
    let database = Database::new(backend.clone());
    let (watcher, _history) = Watcher::new(&database, "history").unwrap();
    let task = tokio::spawn(async move { watcher.watch(CancellationToken::new(), &["movies"]).await });
    wait_until(|| {
        let backend = backend.clone();
        async move { backend.subscriber_count() > 0 }
    })
    .await;

    // The test runtime is single threaded, so the watcher can not drain the
    // feed between these publishes.
    for i in 0..4 {
        backend.inject_event(json!({"seq": i}));
    }

    let outcome = task.await.unwrap();
    assert!(matches!(
        outcome,
        Err(WatchError::Store(StoreError::FeedLagged(3)))
    ));
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn watcher_on_uninitialized_database_fails_at_construction() {
    let err = Watcher::new(&Database::default(), "history").unwrap_err();
    assert!(matches!(err, StoreError::ConnectionNotInitialized));
}
