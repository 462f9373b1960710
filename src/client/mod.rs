//! Content-realm half of the bridge: sends requests to the page realm and
//! settles them when the matching response or error envelope comes back.

pub mod actions;
pub mod social;
pub mod upload;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bridge::message::{
    DetailRequest, ReplyPayload, ACTION_ERROR, ACTION_RESPONSE, DETAIL_ERROR, DETAIL_REQUEST,
    DETAIL_RESPONSE, FOLLOWING_LIST_ERROR, FOLLOWING_LIST_RESPONSE, FRIENDSHIP_ERROR,
    FRIENDSHIP_RESPONSE, POLL_VOTE_ERROR, POLL_VOTE_RESPONSE, TIMELINE_UPDATE, UPLOAD_ERROR,
    UPLOAD_PROGRESS, UPLOAD_RESPONSE,
};
use crate::bridge::{create_request_id, BridgeEndpoint, PendingReceiver, PendingRequests};
use crate::error::BridgeError;
use crate::interceptor::UploadProgress;
use crate::store::detail::strip_promoted_entries;
use crate::store::timeline::ingest_timeline;
use crate::store::{DetailCache, TweetStore};

pub use actions::{ActionOperation, ReplyOptions};
pub use social::{FollowingListEntry, FollowingListResult};
pub use upload::{infer_media_category, UploadOptions};

type PendingSelector<P> = fn(&ContentClient) -> &PendingRequests<Value, P>;

pub struct ContentClient {
    endpoint: Arc<BridgeEndpoint>,
    store: Arc<TweetStore>,
    details: Arc<DetailCache>,
    request_timeout: Option<Duration>,
    detail_pending: PendingRequests<Value>,
    action_pending: PendingRequests<Value>,
    poll_pending: PendingRequests<Value>,
    friendship_pending: PendingRequests<Value>,
    following_pending: PendingRequests<Value>,
    upload_pending: PendingRequests<Value, UploadProgress>,
    following_cache: Mutex<HashMap<String, FollowingListResult>>,
}

impl ContentClient {
    pub fn new(
        endpoint: Arc<BridgeEndpoint>,
        store: Arc<TweetStore>,
        details: Arc<DetailCache>,
    ) -> Self {
        Self {
            endpoint,
            store,
            details,
            request_timeout: None,
            detail_pending: PendingRequests::new(),
            action_pending: PendingRequests::new(),
            poll_pending: PendingRequests::new(),
            friendship_pending: PendingRequests::new(),
            following_pending: PendingRequests::new(),
            upload_pending: PendingRequests::new(),
            following_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bound every round-trip. Without one a request waits until answered.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<TweetStore> {
        &self.store
    }

    pub fn details(&self) -> &Arc<DetailCache> {
        &self.details
    }

    pub fn endpoint(&self) -> &Arc<BridgeEndpoint> {
        &self.endpoint
    }

    /// Register the inbound handlers. Handlers hold a weak reference, so a
    /// dropped client simply stops answering.
    pub fn connect(self: &Arc<Self>) {
        self.route_replies(DETAIL_RESPONSE, DETAIL_ERROR, |c| &c.detail_pending);
        self.route_replies(ACTION_RESPONSE, ACTION_ERROR, |c| &c.action_pending);
        self.route_replies(POLL_VOTE_RESPONSE, POLL_VOTE_ERROR, |c| &c.poll_pending);
        self.route_replies(FRIENDSHIP_RESPONSE, FRIENDSHIP_ERROR, |c| {
            &c.friendship_pending
        });
        self.route_replies(FOLLOWING_LIST_RESPONSE, FOLLOWING_LIST_ERROR, |c| {
            &c.following_pending
        });
        self.route_replies(UPLOAD_RESPONSE, UPLOAD_ERROR, |c| &c.upload_pending);

        let client = Arc::downgrade(self);
        self.endpoint.register_handler(UPLOAD_PROGRESS, move |payload| {
            let Some(client) = client.upgrade() else {
                return;
            };
            let Some(request_id) = payload.get("requestId").and_then(Value::as_str) else {
                return;
            };
            match serde_json::from_value::<UploadProgress>(payload["data"].clone()) {
                Ok(progress) => {
                    client.upload_pending.progress(request_id, progress);
                }
                Err(err) => debug!("unreadable upload progress for {}: {}", request_id, err),
            }
        });

        // A lagged listener may have lost any answer, so nothing outstanding
        // can be trusted to settle.
        let client = Arc::downgrade(self);
        self.endpoint.register_lag_handler(move |_| {
            let Some(client) = client.upgrade() else {
                return;
            };
            let failed = client.fail_outstanding();
            if failed > 0 {
                warn!("failed {} outstanding requests after bridge lag", failed);
            }
        });

        let client = Arc::downgrade(self);
        self.endpoint.register_handler(TIMELINE_UPDATE, move |payload| {
            let Some(client) = client.upgrade() else {
                return;
            };
            let Some(response) = payload.get("response") else {
                return;
            };
            let summary = ingest_timeline(&client.store, response, None);
            debug!(
                "timeline update: {} tweets, {} tombstones",
                summary.tweets, summary.tombstones
            );
        });
    }

    fn fail_outstanding(&self) -> usize {
        let dropped = |request_id: &str| BridgeError::Dropped(request_id.to_string());
        self.detail_pending.fail_all(dropped)
            + self.action_pending.fail_all(dropped)
            + self.poll_pending.fail_all(dropped)
            + self.friendship_pending.fail_all(dropped)
            + self.following_pending.fail_all(dropped)
            + self.upload_pending.fail_all(dropped)
    }

    fn route_replies<P: 'static>(
        self: &Arc<Self>,
        response_type: &'static str,
        error_type: &'static str,
        pending: PendingSelector<P>,
    ) {
        let client: Weak<Self> = Arc::downgrade(self);
        self.endpoint.register_handler(response_type, move |payload| {
            let Some(client) = client.upgrade() else {
                return;
            };
            match serde_json::from_value::<ReplyPayload>(payload) {
                Ok(reply) => {
                    pending(&client).resolve(&reply.request_id, reply.data);
                }
                Err(err) => debug!("malformed {} payload: {}", response_type, err),
            }
        });

        let client: Weak<Self> = Arc::downgrade(self);
        self.endpoint.register_handler(error_type, move |payload| {
            let Some(client) = client.upgrade() else {
                return;
            };
            match serde_json::from_value::<ReplyPayload>(payload) {
                Ok(reply) => {
                    let message = reply.error.unwrap_or_else(|| "unknown error".to_string());
                    pending(&client).reject(&reply.request_id, message);
                }
                Err(err) => debug!("malformed {} payload: {}", error_type, err),
            }
        });
    }

    /// Register `request_id`, post the request and wait for its answer.
    pub(crate) async fn round_trip<P, R>(
        &self,
        pending: &PendingRequests<Value, P>,
        request_type: &str,
        request_id: &str,
        request: &R,
    ) -> Result<Value, BridgeError>
    where
        R: Serialize,
    {
        let payload =
            serde_json::to_value(request).map_err(|err| BridgeError::Decode(err.to_string()))?;
        let rx = pending.register(request_id);
        self.endpoint.send(request_type, payload);
        self.await_reply(pending, request_id, rx).await
    }

    pub(crate) async fn await_reply<T, P>(
        &self,
        pending: &PendingRequests<T, P>,
        request_id: &str,
        rx: PendingReceiver<T>,
    ) -> Result<T, BridgeError> {
        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    pending.forget(request_id);
                    warn!("request {} timed out", request_id);
                    return Err(BridgeError::Timeout {
                        request_id: request_id.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => rx.await,
        };
        outcome.map_err(|_| BridgeError::Dropped(request_id.to_string()))?
    }

    /// Full conversation payload for `tweet_id`, served from the detail cache
    /// unless `force` is set.
    ///
    /// A fresh payload has its promoted entries removed, is cached and is
    /// ingested into the tweet store before it is returned.
    pub async fn request_tweet_detail(
        &self,
        tweet_id: &str,
        controller_data: Option<String>,
        force: bool,
    ) -> Result<Value, BridgeError> {
        if force {
            self.details.clear(tweet_id);
        } else if let Some(cached) = self.details.get(tweet_id) {
            return Ok(cached);
        }

        let controller_data = controller_data.or_else(|| self.store.controller_data(tweet_id));
        let request = DetailRequest {
            request_id: create_request_id(tweet_id),
            tweet_id: tweet_id.to_string(),
            controller_data,
        };
        let mut detail = self
            .round_trip(&self.detail_pending, DETAIL_REQUEST, &request.request_id, &request)
            .await?;

        strip_promoted_entries(&mut detail);
        self.details.set(tweet_id, detail.clone());
        let summary = ingest_timeline(&self.store, &detail, Some(tweet_id));
        debug!(
            "detail {} hydrated {} tweets, {} tombstones",
            tweet_id, summary.tweets, summary.tombstones
        );
        Ok(detail)
    }
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::bridge::message::{Direction, Envelope};
    use crate::bridge::{MessageBus, PostedMessage, WindowId};
    use crate::store::ManualClock;

    /// A connected client plus a raw view of everything it posts.
    pub struct Harness {
        pub client: Arc<ContentClient>,
        pub clock: Arc<ManualClock>,
        pub outbound: tokio::sync::broadcast::Receiver<PostedMessage>,
    }

    impl Harness {
        pub fn new(timeout: Option<Duration>) -> Self {
            let bus = MessageBus::default();
            let outbound = bus.subscribe();
            let endpoint = Arc::new(BridgeEndpoint::new(
                bus,
                WindowId(1),
                Direction::ToInterceptor,
            ));
            let clock = Arc::new(ManualClock::new(0));
            let details = Arc::new(DetailCache::new(clock.clone()));
            let client = Arc::new(
                ContentClient::new(endpoint, Arc::new(TweetStore::new()), details)
                    .with_request_timeout(timeout),
            );
            client.connect();
            Self {
                client,
                clock,
                outbound,
            }
        }

        /// Next envelope the client posted.
        pub async fn next_request(&mut self) -> Envelope {
            let posted = self.outbound.recv().await.unwrap();
            serde_json::from_value(posted.data).unwrap()
        }

        /// Deliver an envelope as if the page realm had posted it.
        pub fn reply(&self, kind: &str, payload: Value) {
            let envelope = Envelope::new(Direction::FromInterceptor, kind, payload);
            let message = PostedMessage {
                window: WindowId(1),
                data: serde_json::to_value(envelope).unwrap(),
            };
            self.client.endpoint.dispatch(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::harness::Harness;
    use super::*;
    use crate::store::timeline::fixtures::{conversation, item_entry};
    use crate::store::fixtures::tweet;
    use serde_json::json;

    fn promoted_entry() -> Value {
        json!({
            "entryId": "promoted-tweet-99",
            "content": {
                "entryType": "TimelineTimelineItem",
                "itemContent": {
                    "tweet_results": {"result": tweet("99", "ad", None)},
                    "promotedMetadata": {"advertiser": "x"}
                }
            }
        })
    }

    #[tokio::test]
    async fn test_detail_round_trip_hydrates_store_and_cache() {
        let mut h = Harness::new(None);
        h.client
            .store
            .store_tweet(&tweet("1", "a", None), Some("cd-1".into()), false, Default::default());

        let client = h.client.clone();
        let task = tokio::spawn(async move { client.request_tweet_detail("1", None, false).await });

        let request = h.next_request().await;
        assert_eq!(request.kind, DETAIL_REQUEST);
        assert_eq!(request.payload["tweetId"], "1");
        assert_eq!(request.payload["controllerData"], "cd-1");
        let request_id = request.payload["requestId"].as_str().unwrap().to_string();

        let detail = conversation(vec![
            item_entry("tweet-1", tweet("1", "a", None), None),
            item_entry("tweet-2", tweet("2", "b", Some("1")), None),
            promoted_entry(),
        ]);
        h.reply(DETAIL_RESPONSE, json!({"requestId": request_id, "data": detail}));

        let detail = task.await.unwrap().unwrap();
        let entries = detail
            .pointer("/data/threaded_conversation_with_injections_v2/instructions/0/entries")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(h.client.store.contains("2"));
        assert!(!h.client.store.contains("99"));
        assert!(h.client.details.get("1").is_some());
        assert!(h.client.detail_pending.is_empty());
    }

    #[tokio::test]
    async fn test_cached_detail_skips_bridge() {
        let mut h = Harness::new(None);
        h.client.details.set("5", json!({"cached": true}));
        let detail = h.client.request_tweet_detail("5", None, false).await.unwrap();
        assert_eq!(detail["cached"], true);
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_error_envelope_rejects_caller() {
        let mut h = Harness::new(None);
        let client = h.client.clone();
        let task = tokio::spawn(async move { client.request_tweet_detail("3", None, true).await });
        let request = h.next_request().await;
        let request_id = request.payload["requestId"].as_str().unwrap().to_string();

        h.reply(DETAIL_ERROR, json!({"requestId": "someone-else", "error": "nope"}));
        h.reply(DETAIL_ERROR, json!({"requestId": request_id, "error": "TweetDetail request failed with status 404"}));

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            BridgeError::Remote("TweetDetail request failed with status 404".into())
        );
        assert!(h.client.details.get("3").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forgets_pending_entry() {
        let h = Harness::new(Some(Duration::from_secs(5)));
        let err = h.client.request_tweet_detail("4", None, false).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { secs: 5, .. }));
        assert!(h.client.detail_pending.is_empty());
    }

    #[tokio::test]
    async fn test_bridge_lag_fails_outstanding_requests() {
        use crate::bridge::{Direction, MessageBus, WindowId};

        let bus = MessageBus::new(1);
        let endpoint = Arc::new(BridgeEndpoint::new(
            bus.clone(),
            WindowId(1),
            Direction::ToInterceptor,
        ));
        let client = Arc::new(ContentClient::new(
            Arc::clone(&endpoint),
            Arc::new(TweetStore::new()),
            Arc::new(DetailCache::default()),
        ));
        client.connect();
        let _listener = endpoint.spawn();

        let waiter = client.clone();
        let task = tokio::spawn(async move { waiter.request_tweet_detail("6", None, false).await });
        while client.detail_pending.is_empty() {
            tokio::task::yield_now().await;
        }
        // Overrun the single-slot bus before the listener gets to run.
        for n in 0..3 {
            bus.post(WindowId(1), json!({"noise": n}));
        }

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Dropped(ref id) if id.starts_with("6-")), "{:?}", err);
        assert!(client.detail_pending.is_empty());
    }

    #[tokio::test]
    async fn test_timeline_update_is_ingested() {
        let h = Harness::new(None);
        let response = conversation(vec![item_entry("tweet-8", tweet("8", "a", None), Some("cd"))]);
        h.reply(TIMELINE_UPDATE, json!({"response": response, "request": {}}));
        assert_eq!(h.client.store.controller_data("8").as_deref(), Some("cd"));
    }
}
