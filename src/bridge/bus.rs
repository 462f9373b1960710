use serde_json::Value;
use tokio::sync::broadcast;

/// Identity of the page window a message was posted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub window: WindowId,
    pub data: Value,
}

/// In-process stand-in for `window.postMessage`: every subscriber sees every
/// message, and filtering is left to the receiving endpoint.
#[derive(Debug, Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<PostedMessage>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget. A message posted with nobody listening is lost.
    pub fn post(&self, window: WindowId, data: Value) {
        let _ = self.tx.send(PostedMessage { window, data });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostedMessage> {
        self.tx.subscribe()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
