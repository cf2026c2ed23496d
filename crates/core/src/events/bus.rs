use serde_json::Value;
use tokio::sync::broadcast;

/// Default number of records buffered per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Fan-out of raw change-feed records to in-process subscribers.
///
/// Records published while nobody listens are gone. A subscriber that
/// falls more than `capacity` records behind loses the oldest ones and is
/// told how many on its next receive.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Value>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of subscribers the record reached.
    pub fn publish(&self, record: Value) -> usize {
        self.sender.send(record).unwrap_or(0)
    }

    /// Receiver for records published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
