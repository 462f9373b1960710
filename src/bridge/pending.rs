use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::BridgeError;

pub type ProgressCallback<P> = Arc<dyn Fn(P) + Send + Sync>;
pub type PendingReceiver<T> = oneshot::Receiver<Result<T, BridgeError>>;

struct PendingEntry<T, P> {
    tx: oneshot::Sender<Result<T, BridgeError>>,
    on_progress: Option<ProgressCallback<P>>,
}

/// Correlates outstanding requests with the envelopes that answer them.
///
/// An entry is removed by the first response or error carrying its id and
/// never before; progress notifications leave it in place.
pub struct PendingRequests<T, P = ()> {
    entries: Mutex<HashMap<String, PendingEntry<T, P>>>,
}

impl<T, P> PendingRequests<T, P> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, request_id: &str) -> PendingReceiver<T> {
        self.insert(request_id, None)
    }

    pub fn register_with_progress(
        &self,
        request_id: &str,
        on_progress: ProgressCallback<P>,
    ) -> PendingReceiver<T> {
        self.insert(request_id, Some(on_progress))
    }

    fn insert(
        &self,
        request_id: &str,
        on_progress: Option<ProgressCallback<P>>,
    ) -> PendingReceiver<T> {
        let (tx, rx) = oneshot::channel();
        self.entries
            .lock()
            .insert(request_id.to_string(), PendingEntry { tx, on_progress });
        rx
    }

    pub fn resolve(&self, request_id: &str, value: T) -> bool {
        self.settle(request_id, Ok(value))
    }

    pub fn reject(&self, request_id: &str, message: impl Into<String>) -> bool {
        self.settle(request_id, Err(BridgeError::Remote(message.into())))
    }

    fn settle(&self, request_id: &str, outcome: Result<T, BridgeError>) -> bool {
        let Some(entry) = self.entries.lock().remove(request_id) else {
            debug!("dropping response for unknown request {}", request_id);
            return false;
        };
        // The waiter may have given up; that is not our problem.
        let _ = entry.tx.send(outcome);
        true
    }

    pub fn progress(&self, request_id: &str, value: P) -> bool {
        let callback = self
            .entries
            .lock()
            .get(request_id)
            .and_then(|entry| entry.on_progress.clone());
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Drop an entry without answering it (used when a bounded wait expires).
    pub fn forget(&self, request_id: &str) -> bool {
        self.entries.lock().remove(request_id).is_some()
    }

    /// Settle every outstanding entry with the error `fail` builds from its
    /// id. Returns how many were failed.
    pub fn fail_all(&self, fail: impl Fn(&str) -> BridgeError) -> usize {
        let drained: Vec<(String, PendingEntry<T, P>)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (request_id, entry) in drained {
            debug!("failing outstanding request {}", request_id);
            let _ = entry.tx.send(Err(fail(&request_id)));
        }
        count
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, P> Default for PendingRequests<T, P> {
    fn default() -> Self {
        Self::new()
    }
}
