use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use super::{History, Recorder};
use crate::error::{StoreError, WatchError};
use crate::events::stream::ChangeStream;
use crate::events::types::ChangeEvent;
use crate::store::{Collection, Database};

/// Follows a database's change feed and records a [`History`] entry for
/// every mutation in the watched collections.
///
/// [`Watcher::watch`] runs until cancelled or until something fails; the
/// caller decides where it runs and what to do with its outcome.
#[derive(Debug, Clone)]
pub struct Watcher {
    database: Database,
    recorder: Recorder,
}

impl Watcher {
    /// Create a watcher writing to `history_collection`, along with a handle
    /// to that collection.
    pub fn new(
        database: &Database,
        history_collection: &str,
    ) -> Result<(Self, Collection<History>), StoreError> {
        database.validate()?;
        let history = Collection::new(database, history_collection)?;
        let watcher = Self {
            database: database.clone(),
            recorder: Recorder::new(history.clone()),
        };
        Ok((watcher, history))
    }

    pub fn history_collection(&self) -> &str {
        self.recorder.collection_name()
    }

    /// Record every change to `collections` until `cancel` fires.
    ///
    /// Events are handled one at a time in feed order. An event that was
    /// already pulled from the feed is recorded before cancellation is
    /// looked at again.
    pub async fn watch(
        &self,
        cancel: CancellationToken,
        collections: &[&str],
    ) -> Result<(), WatchError> {
        let history = self.history_collection();
        if collections.contains(&history) {
            return Err(WatchError::WatchingHistoryCollection(history.to_string()));
        }
        let watched: HashSet<&str> = collections.iter().copied().collect();

        let mut stream = self.database.watch().await?;
        info!(?collections, history, "watching for changes");

        let outcome = self.follow(&cancel, &watched, stream.as_mut()).await;
        stream.close().await;

        match &outcome {
            Ok(()) => info!(history, "stopped watching"),
            Err(err) => error!(history, %err, "watch aborted"),
        }
        outcome
    }

    async fn follow(
        &self,
        cancel: &CancellationToken,
        watched: &HashSet<&str>,
        stream: &mut dyn ChangeStream,
    ) -> Result<(), WatchError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            let Some(record) = next else {
                info!("change feed closed by its source");
                return Ok(());
            };

            let event: ChangeEvent = serde_json::from_value(record?).map_err(WatchError::Decode)?;
            if !watched.contains(event.ns.coll.as_str()) {
                trace!(collection = %event.ns.coll, "skipping unwatched collection");
                continue;
            }
            self.recorder.record(&event).await?;
        }
    }
}
