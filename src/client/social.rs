use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ContentClient;
use crate::bridge::create_request_id;
use crate::bridge::message::{
    FollowingListRequest, FriendshipAction, FriendshipRequest, PollVoteRequest,
    FOLLOWING_LIST_REQUEST, FRIENDSHIP_REQUEST, POLL_VOTE_REQUEST,
};
use crate::error::{BridgeError, ValidationError};
use crate::interceptor::social::{CARDS_PLATFORM_DEFAULT, DEFAULT_USER_PARAMS};
use crate::poll::PollInfo;

fn required(value: Option<&str>, missing: ValidationError) -> Result<String, ValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(missing)
}

fn trimmed_user_id(user_id: &str) -> Result<&str, ValidationError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ValidationError::MissingUserId);
    }
    Ok(user_id)
}

/// Form body shared by follow and unfollow.
pub fn friendship_form_body(user_id: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(DEFAULT_USER_PARAMS)
        .append_pair("user_id", user_id)
        .finish()
}

#[derive(Debug, Default, Deserialize)]
struct RawFollowingUser {
    id: Option<u64>,
    id_str: Option<String>,
    name: Option<String>,
    screen_name: Option<String>,
    description: Option<String>,
    profile_image_url_https: Option<String>,
    profile_image_url: Option<String>,
    following: Option<bool>,
    followed_by: Option<bool>,
    can_dm: Option<bool>,
    can_media_tag: Option<bool>,
    muting: Option<bool>,
    blocking: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFollowingList {
    #[serde(default)]
    users: Vec<RawFollowingUser>,
    next_cursor: Option<i64>,
    next_cursor_str: Option<String>,
    previous_cursor: Option<i64>,
    previous_cursor_str: Option<String>,
    total_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowingListEntry {
    pub id: String,
    pub name: String,
    pub screen_name: String,
    pub description: String,
    pub avatar_url: Option<String>,
    pub is_following: bool,
    pub is_followed_by: bool,
    pub can_dm: bool,
    pub can_media_tag: bool,
    pub is_muting: bool,
    pub is_blocking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowingListResult {
    pub users: Vec<FollowingListEntry>,
    pub next_cursor: Option<String>,
    pub previous_cursor: Option<String>,
    pub total_count: Option<u64>,
}

impl FollowingListEntry {
    fn from_raw(user: RawFollowingUser) -> Option<Self> {
        let id = user
            .id_str
            .filter(|id| !id.is_empty())
            .or_else(|| user.id.map(|id| id.to_string()))?;
        Some(Self {
            id,
            name: user.name.unwrap_or_default(),
            screen_name: user.screen_name.unwrap_or_default(),
            description: user.description.unwrap_or_default(),
            avatar_url: user.profile_image_url_https.or(user.profile_image_url),
            is_following: user.following.unwrap_or(false),
            is_followed_by: user.followed_by.unwrap_or(false),
            can_dm: user.can_dm.unwrap_or(false),
            can_media_tag: user.can_media_tag.unwrap_or(false),
            is_muting: user.muting.unwrap_or(false),
            is_blocking: user.blocking.unwrap_or(false),
        })
    }
}

/// A `"0"` cursor marks the end of the list.
fn cursor(text: Option<String>, number: Option<i64>) -> Option<String> {
    text.or_else(|| number.map(|n| n.to_string()))
        .filter(|c| !c.is_empty() && c != "0")
}

/// Normalise a `friends/following/list.json` payload.
pub fn normalize_following_list(data: &Value) -> FollowingListResult {
    let raw: RawFollowingList = serde_json::from_value(data.clone()).unwrap_or_else(|err| {
        debug!("unexpected following list shape: {}", err);
        RawFollowingList::default()
    });
    FollowingListResult {
        users: raw
            .users
            .into_iter()
            .filter_map(FollowingListEntry::from_raw)
            .collect(),
        next_cursor: cursor(raw.next_cursor_str, raw.next_cursor),
        previous_cursor: cursor(raw.previous_cursor_str, raw.previous_cursor),
        total_count: raw.total_count,
    }
}

fn following_cache_key(user_id: &str, count: Option<u32>, cursor: Option<&str>) -> String {
    let count = count.map_or_else(|| "default".to_string(), |c| c.to_string());
    format!("{}|{}|{}", user_id, count, cursor.unwrap_or("start"))
}

impl ContentClient {
    /// Vote in the poll described by `poll`. Endpoint, card uri and card name
    /// must all be known before the vote is sent.
    pub async fn vote_in_poll(
        &self,
        poll: &PollInfo,
        tweet_id: &str,
        choice_id: u32,
        cards_platform: Option<&str>,
    ) -> Result<Value, BridgeError> {
        let endpoint = required(poll.endpoint.as_deref(), ValidationError::MissingPollEndpoint)?;
        let card_uri = required(poll.card_uri.as_deref(), ValidationError::MissingPollCardUri)?;
        let card_name = required(poll.card_name.as_deref(), ValidationError::MissingPollCardName)?;
        let request = PollVoteRequest {
            request_id: create_request_id("poll-vote"),
            endpoint,
            card_uri,
            card_name,
            tweet_id: tweet_id.to_string(),
            choice_id,
            cards_platform: Some(cards_platform.unwrap_or(CARDS_PLATFORM_DEFAULT).to_string()),
        };
        self.round_trip(&self.poll_pending, POLL_VOTE_REQUEST, &request.request_id, &request)
            .await
    }

    async fn send_friendship(
        &self,
        action: FriendshipAction,
        user_id: &str,
    ) -> Result<Value, BridgeError> {
        let user_id = trimmed_user_id(user_id)?;
        let request = FriendshipRequest {
            request_id: create_request_id(&format!("{}-{}", action.as_str(), user_id)),
            action,
            user_id: user_id.to_string(),
            body: friendship_form_body(user_id),
        };
        self.round_trip(
            &self.friendship_pending,
            FRIENDSHIP_REQUEST,
            &request.request_id,
            &request,
        )
        .await
    }

    pub async fn follow_user(&self, user_id: &str) -> Result<Value, BridgeError> {
        self.send_friendship(FriendshipAction::Follow, user_id).await
    }

    pub async fn unfollow_user(&self, user_id: &str) -> Result<Value, BridgeError> {
        self.send_friendship(FriendshipAction::Unfollow, user_id).await
    }

    /// One page of the accounts `user_id` follows. Pages are cached for the
    /// session per (user, count, cursor).
    pub async fn fetch_following_list(
        &self,
        user_id: &str,
        count: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<FollowingListResult, BridgeError> {
        let user_id = trimmed_user_id(user_id)?;
        let key = following_cache_key(user_id, count, cursor);
        if let Some(cached) = self.following_cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let request = FollowingListRequest {
            request_id: create_request_id(&format!("following-list-{}", user_id)),
            user_id: user_id.to_string(),
            count,
            cursor: cursor.map(str::to_string),
        };
        let data = self
            .round_trip(
                &self.following_pending,
                FOLLOWING_LIST_REQUEST,
                &request.request_id,
                &request,
            )
            .await?;
        let normalized = normalize_following_list(&data);
        self.following_cache.lock().insert(key, normalized.clone());
        Ok(normalized)
    }
}
