//! Type-tag discrimination for vendor tweet results.
//!
//! Raw `tweet_results.result` values come in three flavours: a bare `Tweet`,
//! a `TweetWithVisibilityResults` wrapper carrying limited actions, or a
//! `TweetTombstone`. Everything past this module works with
//! [`NormalizedResult`] only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitedAction {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
}

/// How a write treats the limited actions already on record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LimitedActionsUpdate {
    /// The new write says nothing; carry the previous value forward.
    #[default]
    Keep,
    /// The new write is authoritative, including an explicit `None`.
    Replace(Option<Vec<LimitedAction>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult {
    Tweet(Value),
    WithVisibility {
        tweet: Value,
        limited_actions: Option<Vec<LimitedAction>>,
    },
    Tombstone(Value),
    Unknown,
}

impl NormalizedResult {
    /// The live tweet and the limited-actions write that goes with it.
    pub fn into_live(self) -> Option<(Value, LimitedActionsUpdate)> {
        match self {
            NormalizedResult::Tweet(tweet) => Some((tweet, LimitedActionsUpdate::Keep)),
            NormalizedResult::WithVisibility {
                tweet,
                limited_actions,
            } => Some((tweet, LimitedActionsUpdate::Replace(limited_actions))),
            NormalizedResult::Tombstone(_) | NormalizedResult::Unknown => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            NormalizedResult::Tweet(_) | NormalizedResult::WithVisibility { .. }
        )
    }
}

fn typename(value: &Value) -> Option<&str> {
    value.get("__typename").and_then(Value::as_str)
}

pub fn normalize_tweet_result(value: &Value) -> NormalizedResult {
    if !value.is_object() {
        return NormalizedResult::Unknown;
    }
    match typename(value) {
        Some("Tweet") if tweet_id(value).is_some() => NormalizedResult::Tweet(value.clone()),
        Some("TweetWithVisibilityResults") => {
            let Some(inner) = value.get("tweet").filter(|inner| tweet_id(inner).is_some()) else {
                return NormalizedResult::Unknown;
            };
            let limited_actions = value
                .pointer("/limitedActionResults/limited_actions")
                .and_then(Value::as_array)
                .map(|actions| {
                    actions
                        .iter()
                        .filter_map(|action| serde_json::from_value(action.clone()).ok())
                        .collect()
                });
            NormalizedResult::WithVisibility {
                tweet: inner.clone(),
                limited_actions,
            }
        }
        Some("TweetTombstone") => NormalizedResult::Tombstone(value.clone()),
        _ => NormalizedResult::Unknown,
    }
}

pub fn is_tweet_result(value: &Value) -> bool {
    typename(value) == Some("Tweet") && tweet_id(value).is_some()
}

pub fn tweet_id(tweet: &Value) -> Option<String> {
    tweet
        .get("rest_id")
        .and_then(Value::as_str)
        .or_else(|| tweet.pointer("/legacy/id_str").and_then(Value::as_str))
        .map(str::to_string)
}

pub fn parent_tweet_id(tweet: &Value) -> Option<String> {
    let legacy = tweet.get("legacy")?;
    legacy
        .get("in_reply_to_status_id_str")
        .and_then(Value::as_str)
        .or_else(|| legacy.get("in_reply_to_tweet_id_str").and_then(Value::as_str))
        .map(str::to_string)
}

fn user_result(tweet: &Value) -> Option<&Value> {
    tweet
        .pointer("/core/user_results/result")
        .filter(|user| typename(user) == Some("User"))
}

pub fn user_id(tweet: &Value) -> Option<String> {
    let user = user_result(tweet);
    user.and_then(|u| u.get("rest_id"))
        .and_then(Value::as_str)
        .or_else(|| tweet.pointer("/legacy/user_id_str").and_then(Value::as_str))
        .or_else(|| user.and_then(|u| u.get("id")).and_then(Value::as_str))
        .or_else(|| {
            tweet
                .pointer("/core/user_results/result/rest_id")
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

pub fn screen_name(tweet: &Value) -> Option<String> {
    let user = user_result(tweet)?;
    user.pointer("/core/screen_name")
        .or_else(|| user.pointer("/legacy/screen_name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn full_text(tweet: &Value) -> Option<&str> {
    tweet
        .pointer("/note_tweet/note_tweet_results/result/text")
        .or_else(|| tweet.pointer("/legacy/full_text"))
        .and_then(Value::as_str)
}

pub fn quoted_result(tweet: &Value) -> Option<NormalizedResult> {
    let raw = tweet.pointer("/quoted_status_result/result")?;
    let normalized = normalize_tweet_result(raw);
    normalized.is_live().then_some(normalized)
}

/// Retweeted status, checking both the top-level and the legacy location.
pub fn retweeted_result(tweet: &Value) -> Option<NormalizedResult> {
    ["/retweeted_status_result/result", "/legacy/retweeted_status_result/result"]
        .iter()
        .filter_map(|path| tweet.pointer(path))
        .map(normalize_tweet_result)
        .find(NormalizedResult::is_live)
}

/// First non-empty `details.timelinesDetails.controllerData` among the sources.
pub fn select_controller_data(sources: &[Option<&Value>]) -> Option<String> {
    sources
        .iter()
        .flatten()
        .filter_map(|source| {
            source
                .pointer("/details/timelinesDetails/controllerData")
                .and_then(Value::as_str)
        })
        .find(|data| !data.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_tweet() {
        let raw = json!({"__typename": "Tweet", "rest_id": "1"});
        assert_eq!(normalize_tweet_result(&raw), NormalizedResult::Tweet(raw.clone()));
        let (_, actions) = normalize_tweet_result(&raw).into_live().unwrap();
        assert_eq!(actions, LimitedActionsUpdate::Keep);
    }

    #[test]
    fn test_tweet_without_id_is_unknown() {
        let raw = json!({"__typename": "Tweet", "legacy": {}});
        assert_eq!(normalize_tweet_result(&raw), NormalizedResult::Unknown);
    }

    #[test]
    fn test_visibility_wrapper_carries_actions() {
        let raw = json!({
            "__typename": "TweetWithVisibilityResults",
            "tweet": {"rest_id": "9", "legacy": {"id_str": "9"}},
            "limitedActionResults": {"limited_actions": [{"action": "Reply", "prompt": {"x": 1}}]}
        });
        let (tweet, actions) = normalize_tweet_result(&raw).into_live().unwrap();
        assert_eq!(tweet_id(&tweet).as_deref(), Some("9"));
        match actions {
            LimitedActionsUpdate::Replace(Some(list)) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].action, "Reply");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_visibility_wrapper_without_actions_clears() {
        let raw = json!({
            "__typename": "TweetWithVisibilityResults",
            "tweet": {"rest_id": "9"}
        });
        let (_, actions) = normalize_tweet_result(&raw).into_live().unwrap();
        assert_eq!(actions, LimitedActionsUpdate::Replace(None));
    }

    #[test]
    fn test_tombstone_is_not_live() {
        let raw = json!({"__typename": "TweetTombstone", "tombstone": {"text": {"text": "gone"}}});
        let normalized = normalize_tweet_result(&raw);
        assert!(matches!(normalized, NormalizedResult::Tombstone(_)));
        assert!(normalized.into_live().is_none());
    }

    #[test]
    fn test_user_id_fallbacks() {
        let with_core = json!({
            "core": {"user_results": {"result": {"__typename": "User", "rest_id": "u1"}}},
            "legacy": {"user_id_str": "u2"}
        });
        assert_eq!(user_id(&with_core).as_deref(), Some("u1"));
        let legacy_only = json!({"legacy": {"user_id_str": "u2"}});
        assert_eq!(user_id(&legacy_only).as_deref(), Some("u2"));
    }

    #[test]
    fn test_parent_prefers_status_id() {
        let tweet = json!({"legacy": {"in_reply_to_status_id_str": "p1", "in_reply_to_tweet_id_str": "p2"}});
        assert_eq!(parent_tweet_id(&tweet).as_deref(), Some("p1"));
        let tweet = json!({"legacy": {"in_reply_to_tweet_id_str": "p2"}});
        assert_eq!(parent_tweet_id(&tweet).as_deref(), Some("p2"));
    }

    #[test]
    fn test_legacy_retweet_location() {
        let tweet = json!({
            "legacy": {"retweeted_status_result": {"result": {"__typename": "Tweet", "rest_id": "x"}}}
        });
        let (inner, _) = retweeted_result(&tweet).unwrap().into_live().unwrap();
        assert_eq!(tweet_id(&inner).as_deref(), Some("x"));
    }

    #[test]
    fn test_select_controller_data_skips_empty() {
        let a = json!({"details": {"timelinesDetails": {"controllerData": ""}}});
        let b = json!({"details": {"timelinesDetails": {"controllerData": "DAAC"}}});
        assert_eq!(
            select_controller_data(&[None, Some(&a), Some(&b)]).as_deref(),
            Some("DAAC")
        );
    }
}
