//! Entity cache for tweets, the relation graph between them and the
//! tombstones left behind by deleted or withheld tweets.

pub mod detail;
pub mod detail_cache;
pub mod normalize;
pub mod relation;
pub mod timeline;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

pub use detail_cache::{CachedDetail, Clock, DetailCache, ManualClock, SystemClock, DETAIL_TTL_MS};
pub use normalize::{LimitedAction, LimitedActionsUpdate, NormalizedResult};
pub use relation::{Relation, RelationKind};

use normalize::{parent_tweet_id, quoted_result, retweeted_result, tweet_id};

#[derive(Debug, Clone, PartialEq)]
pub struct TweetRecord {
    pub id: String,
    pub result: Value,
    pub controller_data: Option<String>,
    pub limited_actions: Option<Vec<LimitedAction>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedTweet {
    pub tweet_id: String,
    pub parent_tweet_id: Option<String>,
    pub tombstone: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    tweets: IndexMap<String, TweetRecord>,
    relations: IndexMap<String, Relation>,
    deleted: IndexMap<String, DeletedTweet>,
}

/// Session-scoped tweet cache.
///
/// All three maps sit behind one lock so a single `store_tweet` updates both
/// ends of every relation it derives before anyone else can look.
#[derive(Default)]
pub struct TweetStore {
    inner: RwLock<StoreInner>,
}

impl TweetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `tweet` and derive its reply, quote and retweet edges.
    ///
    /// Returns the stored id, or `None` when the value carries no id.
    pub fn store_tweet(
        &self,
        tweet: &Value,
        controller_data: Option<String>,
        refresh_relation: bool,
        limited_actions: LimitedActionsUpdate,
    ) -> Option<String> {
        let mut inner = self.inner.write();
        inner.store(tweet, controller_data, refresh_relation, limited_actions)
    }

    pub fn get_tweet(&self, id: &str) -> Option<TweetRecord> {
        self.inner.read().tweets.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().tweets.contains_key(id)
    }

    pub fn get_relation(&self, id: &str) -> Option<Relation> {
        self.inner.read().relations.get(id).cloned()
    }

    pub fn controller_data(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .tweets
            .get(id)
            .and_then(|record| record.controller_data.clone())
    }

    /// Cached tweet, or the retweeted status embedded in some cached tweet.
    ///
    /// An embedded hit is promoted into the cache with its carrier's
    /// controller data, so later lookups are direct.
    pub fn resolve_tweet(&self, id: &str) -> Option<TweetRecord> {
        if let Some(record) = self.get_tweet(id) {
            return Some(record);
        }
        let mut inner = self.inner.write();
        let found = inner.tweets.values().find_map(|candidate| {
            let (inner_tweet, actions) = retweeted_result(&candidate.result)?.into_live()?;
            (tweet_id(&inner_tweet).as_deref() == Some(id)).then(|| {
                (inner_tweet, candidate.controller_data.clone(), actions)
            })
        });
        let (inner_tweet, controller_data, actions) = found?;
        debug!("promoting embedded retweet {}", id);
        inner.store(&inner_tweet, controller_data, false, actions);
        inner.tweets.get(id).cloned()
    }

    pub fn store_deleted(&self, tweet_id: &str, tombstone: Value, parent_tweet_id: Option<String>) {
        let record = DeletedTweet {
            tweet_id: tweet_id.to_string(),
            parent_tweet_id,
            tombstone,
            recorded_at: Utc::now(),
        };
        self.inner.write().deleted.insert(tweet_id.to_string(), record);
    }

    pub fn get_deleted(&self, tweet_id: &str) -> Option<DeletedTweet> {
        self.inner.read().deleted.get(tweet_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tweets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreInner {
    fn store(
        &mut self,
        tweet: &Value,
        controller_data: Option<String>,
        refresh_relation: bool,
        limited_actions: LimitedActionsUpdate,
    ) -> Option<String> {
        let id = tweet_id(tweet)?;
        let previous = self.tweets.get(&id);
        let controller_data =
            controller_data.or_else(|| previous.and_then(|record| record.controller_data.clone()));
        let limited_actions = match limited_actions {
            LimitedActionsUpdate::Keep => previous.and_then(|record| record.limited_actions.clone()),
            LimitedActionsUpdate::Replace(actions) => actions,
        };
        self.tweets.insert(
            id.clone(),
            TweetRecord {
                id: id.clone(),
                result: tweet.clone(),
                controller_data,
                limited_actions,
            },
        );

        if refresh_relation {
            self.relations.shift_remove(&id);
        }

        if let Some(parent) = parent_tweet_id(tweet) {
            self.link(&id, &parent, RelationKind::Reply);
        }

        if let Some((quoted, actions)) = quoted_result(tweet).and_then(NormalizedResult::into_live) {
            if let Some(quoted_id) = tweet_id(&quoted) {
                self.link(&id, &quoted_id, RelationKind::Quote);
                self.store(&quoted, None, false, actions);
            }
        }

        if let Some((retweeted, actions)) =
            retweeted_result(tweet).and_then(NormalizedResult::into_live)
        {
            if let Some(retweeted_id) = tweet_id(&retweeted) {
                self.link(&id, &retweeted_id, RelationKind::Retweet);
                self.store(&retweeted, None, false, actions);
            }
        }

        Some(id)
    }

    fn link(&mut self, from: &str, to: &str, kind: RelationKind) {
        let source = self.relations.entry(from.to_string()).or_default();
        match kind {
            RelationKind::Reply => source.reply_to = Some(to.to_string()),
            RelationKind::Quote => source.quote = Some(to.to_string()),
            RelationKind::Retweet => source.retweet = Some(to.to_string()),
        }
        let target = self.relations.entry(to.to_string()).or_default();
        match kind {
            RelationKind::Reply => {
                target
                    .replies
                    .get_or_insert_with(IndexSet::new)
                    .insert(from.to_string());
            }
            RelationKind::Quote => target.quote_by = Some(from.to_string()),
            RelationKind::Retweet => {
                target
                    .retweet_by
                    .get_or_insert_with(IndexSet::new)
                    .insert(from.to_string());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub fn tweet(id: &str, author: &str, reply_to: Option<&str>) -> Value {
        let mut legacy = json!({"id_str": id, "user_id_str": author, "full_text": format!("tweet {}", id)});
        if let Some(parent) = reply_to {
            legacy["in_reply_to_status_id_str"] = json!(parent);
        }
        json!({
            "__typename": "Tweet",
            "rest_id": id,
            "core": {"user_results": {"result": {
                "__typename": "User",
                "rest_id": author,
                "core": {"screen_name": format!("user{}", author)}
            }}},
            "legacy": legacy
        })
    }
}
