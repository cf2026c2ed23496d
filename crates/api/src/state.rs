use std::sync::Arc;

use doclake_core::history::History;
use doclake_core::store::{Collection, Database};
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of the background watcher task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum WatcherStatus {
    Running,
    Stopped,
    Failed(String),
}

/// Shared application state, passed to all handlers via Axum's `State` extractor.
/// Wrapped in `Arc` so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    database: Database,
    history: Collection<History>,
    watcher: watch::Sender<WatcherStatus>,
}

impl AppState {
    pub fn new(database: Database, history: Collection<History>) -> Self {
        let (watcher, _) = watch::channel(WatcherStatus::Running);
        Self {
            inner: Arc::new(InnerState {
                database,
                history,
                watcher,
            }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn history(&self) -> &Collection<History> {
        &self.inner.history
    }

    pub fn watcher_status(&self) -> WatcherStatus {
        self.inner.watcher.borrow().clone()
    }

    pub fn set_watcher_status(&self, status: WatcherStatus) {
        self.inner.watcher.send_replace(status);
    }

    /// Resolves once the watcher has failed.
    pub async fn watcher_failed(&self) {
        let mut status = self.inner.watcher.subscribe();
        // The sender lives in `self`, so the channel never closes here.
        let _ = status
            .wait_for(|status| matches!(status, WatcherStatus::Failed(_)))
            .await;
    }
}
