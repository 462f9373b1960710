use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{build_snapshot, PreviousView, Snapshot};
use crate::client::ContentClient;
use crate::error::BridgeError;
use crate::store::detail::apply_detail_to_tweet_cache;
use crate::store::timeline::ingest_timeline;

#[derive(Debug, Clone, Default)]
pub struct SidebarState {
    pub focused: Option<String>,
    pub snapshot: Option<Arc<Snapshot>>,
}

/// Owns which tweet the sidebar shows and republishes its snapshot whenever
/// the store learns more about it.
pub struct SidebarController {
    client: Arc<ContentClient>,
    state: watch::Sender<SidebarState>,
}

impl SidebarController {
    pub fn new(client: Arc<ContentClient>) -> Arc<Self> {
        let (state, _) = watch::channel(SidebarState::default());
        Arc::new(Self { client, state })
    }

    pub fn subscribe(&self) -> watch::Receiver<SidebarState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SidebarState {
        self.state.borrow().clone()
    }

    /// Focus `tweet_id` and publish whatever the store already knows.
    ///
    /// When no fresh detail is cached a hydration task is spawned and its
    /// handle returned. The snapshot is rebuilt when it lands, unless the
    /// focus moved on in the meantime.
    pub fn open(self: &Arc<Self>, tweet_id: &str) -> Option<JoinHandle<()>> {
        // Promote a retweet target so the root can be found.
        self.client.store().resolve_tweet(tweet_id);

        self.state.send_modify(|state| {
            let snapshot = build(&self.client, tweet_id, state);
            state.focused = Some(tweet_id.to_string());
            state.snapshot = snapshot;
        });

        if self.client.details().get(tweet_id).is_some() {
            return None;
        }

        let controller = Arc::clone(self);
        let tweet_id = tweet_id.to_string();
        Some(tokio::spawn(async move {
            match controller
                .client
                .request_tweet_detail(&tweet_id, None, false)
                .await
            {
                Ok(_) => controller.rebuild(&tweet_id),
                Err(err) => warn!("hydrating {} failed: {}", tweet_id, err),
            }
        }))
    }

    /// Force a fresh detail for `tweet_id`, re-store its focal tweet with its
    /// edges dropped, relink the conversation and rebuild. On failure the
    /// published state is left untouched.
    pub async fn refresh(&self, tweet_id: &str) -> Result<Option<Arc<Snapshot>>, BridgeError> {
        let detail = self
            .client
            .request_tweet_detail(tweet_id, None, true)
            .await?;
        if !apply_detail_to_tweet_cache(self.client.store(), tweet_id, &detail) {
            debug!("refreshed detail for {} lacks the focal tweet", tweet_id);
        }
        ingest_timeline(self.client.store(), &detail, Some(tweet_id));
        self.rebuild(tweet_id);
        Ok(self.state.borrow().snapshot.clone())
    }

    pub fn close(&self) {
        self.state.send_replace(SidebarState::default());
    }

    fn rebuild(&self, tweet_id: &str) {
        self.state.send_if_modified(|state| {
            if state.focused.as_deref() != Some(tweet_id) {
                debug!("{} lost focus before its rebuild", tweet_id);
                return false;
            }
            state.snapshot = build(&self.client, tweet_id, state);
            true
        });
    }
}

fn build(client: &ContentClient, tweet_id: &str, state: &SidebarState) -> Option<Arc<Snapshot>> {
    let previous = state
        .snapshot
        .as_deref()
        .map(PreviousView::from)
        .unwrap_or_default();
    build_snapshot(client.store(), tweet_id, previous).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::message::{DETAIL_ERROR, DETAIL_RESPONSE};
    use crate::client::harness::Harness;
    use crate::snapshot::SnapshotStatus;
    use crate::store::fixtures::tweet;
    use crate::store::timeline::fixtures::{conversation, item_entry};
    use crate::store::LimitedActionsUpdate;
    use serde_json::json;

    fn seed(h: &Harness, id: &str, author: &str, parent: Option<&str>) {
        h.client
            .store()
            .store_tweet(&tweet(id, author, parent), None, false, LimitedActionsUpdate::Keep);
    }

    #[tokio::test]
    async fn test_open_publishes_then_hydrates() {
        let mut h = Harness::new(None);
        seed(&h, "1", "a", None);
        let controller = SidebarController::new(h.client.clone());
        let mut updates = controller.subscribe();

        let hydration = controller.open("1").unwrap();
        let first = controller.state().snapshot.unwrap();
        assert!(first.related.is_empty());
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();

        let request = h.next_request().await;
        let id = request.payload["requestId"].as_str().unwrap().to_string();
        let detail = conversation(vec![
            item_entry("tweet-1", tweet("1", "a", None), None),
            item_entry("tweet-2", tweet("2", "b", Some("1")), None),
        ]);
        h.reply(DETAIL_RESPONSE, json!({"requestId": id, "data": detail}));
        hydration.await.unwrap();

        assert!(updates.has_changed().unwrap());
        let state = controller.state();
        let snapshot = state.snapshot.unwrap();
        assert!(snapshot.related.contains_key("2"));
        assert_eq!(snapshot.status, SnapshotStatus::Success);
    }

    #[tokio::test]
    async fn test_cached_detail_skips_hydration() {
        let h = Harness::new(None);
        seed(&h, "1", "a", None);
        h.client.details().set("1", json!({}));
        let controller = SidebarController::new(h.client.clone());
        assert!(controller.open("1").is_none());
        assert_eq!(controller.state().focused.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_late_hydration_does_not_steal_focus() {
        let mut h = Harness::new(None);
        seed(&h, "1", "a", None);
        seed(&h, "9", "z", None);
        h.client.details().set("9", json!({}));
        let controller = SidebarController::new(h.client.clone());

        let hydration = controller.open("1").unwrap();
        let request = h.next_request().await;
        assert!(controller.open("9").is_none());

        let id = request.payload["requestId"].as_str().unwrap().to_string();
        let detail = conversation(vec![item_entry("tweet-1", tweet("1", "a", None), None)]);
        h.reply(DETAIL_RESPONSE, json!({"requestId": id, "data": detail}));
        hydration.await.unwrap();

        let state = controller.state();
        assert_eq!(state.focused.as_deref(), Some("9"));
        assert_eq!(state.snapshot.unwrap().tweet.id, "9");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_state() {
        let mut h = Harness::new(None);
        seed(&h, "1", "a", None);
        h.client.details().set("1", json!({}));
        let controller = SidebarController::new(h.client.clone());
        controller.open("1");

        let refresher = Arc::clone(&controller);
        let task = tokio::spawn(async move { refresher.refresh("1").await });
        let request = h.next_request().await;
        let id = request.payload["requestId"].as_str().unwrap().to_string();
        h.reply(DETAIL_ERROR, json!({"requestId": id, "error": "boom"}));

        assert!(task.await.unwrap().is_err());
        assert_eq!(controller.state().snapshot.unwrap().tweet.id, "1");
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_from_fresh_detail() {
        let mut h = Harness::new(None);
        seed(&h, "1", "a", None);
        h.client.details().set("1", json!({}));
        let controller = SidebarController::new(h.client.clone());
        controller.open("1");

        let refresher = Arc::clone(&controller);
        let task = tokio::spawn(async move { refresher.refresh("1").await });
        let request = h.next_request().await;
        let id = request.payload["requestId"].as_str().unwrap().to_string();
        let detail = conversation(vec![
            item_entry("tweet-1", tweet("1", "a", None), None),
            item_entry("tweet-3", tweet("3", "a", Some("1")), None),
        ]);
        h.reply(DETAIL_RESPONSE, json!({"requestId": id, "data": detail}));

        let snapshot = task.await.unwrap().unwrap().unwrap();
        let keys: Vec<&str> = snapshot.timeline.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["1", "3"]);
    }

    #[tokio::test]
    async fn test_close_clears_focus() {
        let h = Harness::new(None);
        seed(&h, "1", "a", None);
        h.client.details().set("1", json!({}));
        let controller = SidebarController::new(h.client.clone());
        controller.open("1");
        controller.close();
        let state = controller.state();
        assert!(state.focused.is_none());
        assert!(state.snapshot.is_none());
    }
}
