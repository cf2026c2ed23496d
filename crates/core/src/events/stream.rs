use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::StoreError;

/// An open, ordered subscription to a database's change feed.
///
/// Records come out as raw JSON so that decoding failures surface in the
/// consumer. `None` means the feed source has shut down.
#[async_trait]
pub trait ChangeStream: Send {
    async fn next(&mut self) -> Option<Result<Value, StoreError>>;

    /// Release the subscription. Further calls to `next` return `None`.
    async fn close(&mut self);
}

/// Change stream over an in-process [`EventBus`](super::bus::EventBus).
pub struct BusStream {
    receiver: Option<broadcast::Receiver<Value>>,
}

impl BusStream {
    pub fn new(receiver: broadcast::Receiver<Value>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }
}

#[async_trait]
impl ChangeStream for BusStream {
    async fn next(&mut self) -> Option<Result<Value, StoreError>> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Ok(record) => Some(Ok(record)),
            Err(RecvError::Closed) => None,
            Err(RecvError::Lagged(skipped)) => Some(Err(StoreError::FeedLagged(skipped))),
        }
    }

    async fn close(&mut self) {
        self.receiver = None;
    }
}
