use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::bus::{MessageBus, PostedMessage, WindowId};
use super::message::{Direction, Envelope, BRIDGE_SOURCE};

pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;
pub type LagHandler = Arc<dyn Fn(u64) + Send + Sync>;

/// One side of the realm boundary.
///
/// An endpoint posts envelopes tagged with its outbound direction and only
/// accepts envelopes that carry the bridge tag, come from its own window and
/// travel in the opposite direction.
pub struct BridgeEndpoint {
    bus: MessageBus,
    window: WindowId,
    outbound: Direction,
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    lag_handlers: RwLock<Vec<LagHandler>>,
}

impl BridgeEndpoint {
    pub fn new(bus: MessageBus, window: WindowId, outbound: Direction) -> Self {
        Self {
            bus,
            window,
            outbound,
            handlers: RwLock::new(HashMap::new()),
            lag_handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn outbound(&self) -> Direction {
        self.outbound
    }

    pub fn send(&self, kind: &str, payload: Value) {
        let envelope = Envelope::new(self.outbound, kind, payload);
        match serde_json::to_value(&envelope) {
            Ok(data) => self.bus.post(self.window, data),
            Err(err) => warn!("failed to encode {} envelope: {}", kind, err),
        }
    }

    pub fn register_handler<F>(&self, kind: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run `handler` with the skipped count whenever the listener falls
    /// behind the bus. Any answer may be among the lost messages.
    pub fn register_lag_handler<F>(&self, handler: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.lag_handlers.write().push(Arc::new(handler));
    }

    fn lagged(&self, skipped: u64) {
        warn!("bridge listener lagged, {} messages lost", skipped);
        let handlers: Vec<LagHandler> = self.lag_handlers.read().clone();
        for handler in &handlers {
            handler(skipped);
        }
    }

    /// Apply the isolation filter. `None` means the message is not ours.
    pub fn accept(&self, message: &PostedMessage) -> Option<Envelope> {
        if message.window != self.window {
            return None;
        }
        let envelope: Envelope = serde_json::from_value(message.data.clone()).ok()?;
        if envelope.source != BRIDGE_SOURCE {
            return None;
        }
        if envelope.direction != self.outbound.reverse() {
            return None;
        }
        Some(envelope)
    }

    /// Route one posted message to its handlers. Returns how many ran.
    pub fn dispatch(&self, message: &PostedMessage) -> usize {
        let Some(envelope) = self.accept(message) else {
            return 0;
        };
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(&envelope.kind)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!("no handler for bridge message {}", envelope.kind);
            return 0;
        }
        for handler in &handlers {
            handler(envelope.payload.clone());
        }
        handlers.len()
    }

    /// Subscribe now and dispatch on a background task until the bus closes.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        endpoint.dispatch(&message);
                    }
                    Err(RecvError::Lagged(skipped)) => endpoint.lagged(skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pair() -> (MessageBus, BridgeEndpoint, BridgeEndpoint) {
        let bus = MessageBus::default();
        let content = BridgeEndpoint::new(bus.clone(), WindowId(1), Direction::ToInterceptor);
        let page = BridgeEndpoint::new(bus.clone(), WindowId(1), Direction::FromInterceptor);
        (bus, content, page)
    }

    #[test]
    fn test_accepts_counterpart_envelope() {
        let (_, content, page) = pair();
        let data = serde_json::to_value(Envelope::new(
            Direction::ToInterceptor,
            "ping",
            json!({}),
        ))
        .unwrap();
        let message = PostedMessage {
            window: WindowId(1),
            data,
        };
        assert!(page.accept(&message).is_some());
        // Own outbound traffic is not echoed back.
        assert!(content.accept(&message).is_none());
    }

    #[test]
    fn test_ignores_foreign_window_and_untagged() {
        let (_, _, page) = pair();
        let mut envelope = Envelope::new(Direction::ToInterceptor, "ping", json!({}));
        let foreign = PostedMessage {
            window: WindowId(2),
            data: serde_json::to_value(&envelope).unwrap(),
        };
        assert!(page.accept(&foreign).is_none());

        envelope.source = "someone-else".into();
        let untagged = PostedMessage {
            window: WindowId(1),
            data: serde_json::to_value(&envelope).unwrap(),
        };
        assert!(page.accept(&untagged).is_none());

        let garbage = PostedMessage {
            window: WindowId(1),
            data: json!("hello"),
        };
        assert!(page.accept(&garbage).is_none());
    }

    #[test]
    fn test_dispatch_runs_handlers_for_type() {
        let (_, _, page) = pair();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        page.register_handler("ping", move |payload| {
            assert_eq!(payload["n"], 7);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let message = PostedMessage {
            window: WindowId(1),
            data: serde_json::to_value(Envelope::new(
                Direction::ToInterceptor,
                "ping",
                json!({"n": 7}),
            ))
            .unwrap(),
        };
        assert_eq!(page.dispatch(&message), 1);
        let other = PostedMessage {
            window: WindowId(1),
            data: serde_json::to_value(Envelope::new(
                Direction::ToInterceptor,
                "pong",
                json!({}),
            ))
            .unwrap(),
        };
        assert_eq!(page.dispatch(&other), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawned_listener_receives_sent_messages() {
        let (bus, content, page) = pair();
        let page = Arc::new(page);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        page.register_handler("ping", move |payload| {
            let _ = tx.send(payload);
        });
        let _task = page.spawn();
        content.send("ping", json!({"hello": "world"}));
        let payload = rx.recv().await.unwrap();
        assert_eq!(payload["hello"], "world");
        drop(bus);
    }

    #[tokio::test]
    async fn test_lagging_listener_runs_lag_handlers() {
        let bus = MessageBus::new(1);
        let content = BridgeEndpoint::new(bus.clone(), WindowId(1), Direction::ToInterceptor);
        let page = Arc::new(BridgeEndpoint::new(
            bus.clone(),
            WindowId(1),
            Direction::FromInterceptor,
        ));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        page.register_lag_handler(move |skipped| {
            let _ = tx.send(skipped);
        });
        let _task = page.spawn();

        // Nothing yields in between, so the listener only wakes after the
        // single-slot bus has overwritten two of these.
        for n in 0..3 {
            content.send("ping", json!({"n": n}));
        }
        assert_eq!(rx.recv().await, Some(2));
    }
}
