use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag carried by every envelope; anything without it is foreign traffic.
pub const BRIDGE_SOURCE: &str = "tsb-x-bridge";

pub const TIMELINE_UPDATE: &str = "timeline:update";

pub const DETAIL_REQUEST: &str = "tweet-detail:request";
pub const DETAIL_RESPONSE: &str = "tweet-detail:response";
pub const DETAIL_ERROR: &str = "tweet-detail:error";

pub const ACTION_REQUEST: &str = "tweet-action:request";
pub const ACTION_RESPONSE: &str = "tweet-action:response";
pub const ACTION_ERROR: &str = "tweet-action:error";

pub const POLL_VOTE_REQUEST: &str = "poll-vote:request";
pub const POLL_VOTE_RESPONSE: &str = "poll-vote:response";
pub const POLL_VOTE_ERROR: &str = "poll-vote:error";

pub const FRIENDSHIP_REQUEST: &str = "friendship:request";
pub const FRIENDSHIP_RESPONSE: &str = "friendship:response";
pub const FRIENDSHIP_ERROR: &str = "friendship:error";

pub const FOLLOWING_LIST_REQUEST: &str = "following-list:request";
pub const FOLLOWING_LIST_RESPONSE: &str = "following-list:response";
pub const FOLLOWING_LIST_ERROR: &str = "following-list:error";

pub const UPLOAD_REQUEST: &str = "media-upload:request";
pub const UPLOAD_PROGRESS: &str = "media-upload:progress";
pub const UPLOAD_RESPONSE: &str = "media-upload:response";
pub const UPLOAD_ERROR: &str = "media-upload:error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "to-interceptor")]
    ToInterceptor,
    #[serde(rename = "from-interceptor")]
    FromInterceptor,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::ToInterceptor => Direction::FromInterceptor,
            Direction::FromInterceptor => Direction::ToInterceptor,
        }
    }
}

/// The only shape that crosses the realm boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: String,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(direction: Direction, kind: &str, payload: Value) -> Self {
        Self {
            source: BRIDGE_SOURCE.to_string(),
            direction,
            kind: kind.to_string(),
            payload,
        }
    }
}

/// `{requestId, data}` or `{requestId, error}` as posted back by the interceptor.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRequest {
    pub request_id: String,
    pub tweet_id: String,
    #[serde(default)]
    pub controller_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub request_id: String,
    pub doc_id: String,
    pub operation_name: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_toggles: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVoteRequest {
    pub request_id: String,
    pub endpoint: String,
    pub card_uri: String,
    pub card_name: String,
    pub tweet_id: String,
    pub choice_id: u32,
    #[serde(default)]
    pub cards_platform: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipAction {
    Follow,
    Unfollow,
}

impl FriendshipAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendshipAction::Follow => "follow",
            FriendshipAction::Unfollow => "unfollow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipRequest {
    pub request_id: String,
    pub action: FriendshipAction,
    pub user_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowingListRequest {
    pub request_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Media bytes travel base64-encoded since the bus only carries JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub request_id: String,
    pub file: String,
    pub media_type: String,
    pub media_category: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_owners: Vec<String>,
}

/// Globally unique request id: `{prefix}-{unix millis}-{random hex}`.
pub fn create_request_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u64 = rand::random();
    format!("{}-{}-{:x}", prefix, millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(
            Direction::ToInterceptor,
            DETAIL_REQUEST,
            json!({"tweetId": "1"}),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["source"], BRIDGE_SOURCE);
        assert_eq!(value["direction"], "to-interceptor");
        assert_eq!(value["type"], DETAIL_REQUEST);
        assert_eq!(value["payload"]["tweetId"], "1");
    }

    #[test]
    fn test_unknown_direction_does_not_parse() {
        let raw = json!({"source": BRIDGE_SOURCE, "direction": "sideways", "type": "x"});
        assert!(serde_json::from_value::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = create_request_id("tweet-detail");
        let b = create_request_id("tweet-detail");
        assert!(a.starts_with("tweet-detail-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_friendship_request_camel_case() {
        let request = FriendshipRequest {
            request_id: "r1".into(),
            action: FriendshipAction::Unfollow,
            user_id: "42".into(),
            body: "user_id=42".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["action"], "unfollow");
        assert_eq!(value["userId"], "42");
    }
}
