use reqwest::Method;
use serde_json::Value;

use super::replay::Replayer;
use super::http::HttpRequest;
use crate::bridge::message::{FollowingListRequest, FriendshipAction, FriendshipRequest, PollVoteRequest};
use crate::error::{ReplayError, ValidationError};

pub const CARDS_PLATFORM_DEFAULT: &str = "Web-12";
pub const FOLLOWING_LIST_PATH: &str = "/i/api/1.1/friends/following/list.json";
pub const DEFAULT_FOLLOWING_COUNT: u32 = 3;

/// Query/form parameters every 1.1 user endpoint is called with.
pub const DEFAULT_USER_PARAMS: [(&str, &str); 12] = [
    ("include_profile_interstitial_type", "1"),
    ("include_blocking", "1"),
    ("include_blocked_by", "1"),
    ("include_followed_by", "1"),
    ("include_want_retweets", "1"),
    ("include_mute_edge", "1"),
    ("include_can_dm", "1"),
    ("include_can_media_tag", "1"),
    ("include_ext_is_blue_verified", "1"),
    ("include_ext_verified_type", "1"),
    ("include_ext_profile_image_shape", "1"),
    ("skip_status", "1"),
];

pub fn friendship_path(action: FriendshipAction) -> &'static str {
    match action {
        FriendshipAction::Follow => "/i/api/1.1/friendships/create.json",
        FriendshipAction::Unfollow => "/i/api/1.1/friendships/destroy.json",
    }
}

/// Poll endpoints arrive as absolute urls, `capi://` references or paths.
pub fn resolve_poll_endpoint(endpoint: &str, origin: &str) -> Result<String, ReplayError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ValidationError::MissingPollEndpoint.into());
    }
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(endpoint.to_string());
    }
    if lower.starts_with("capi://") {
        return Ok(format!("https://caps.x.com/v2/capi/{}", &endpoint["capi://".len()..]));
    }
    Ok(url::Url::parse(origin)?.join(endpoint)?.to_string())
}

pub fn poll_form_body(request: &PollVoteRequest) -> String {
    let platform = request
        .cards_platform
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(CARDS_PLATFORM_DEFAULT);
    let choice = request.choice_id.to_string();
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("twitter:string:card_uri", &request.card_uri)
        .append_pair("twitter:long:original_tweet_id", &request.tweet_id)
        .append_pair("twitter:string:response_card_name", &request.card_name)
        .append_pair("twitter:string:cards_platform", platform)
        .append_pair("twitter:string:selected_choice", &choice)
        .finish()
}

impl Replayer {
    pub async fn perform_poll_vote(&self, request: &PollVoteRequest) -> Result<Value, ReplayError> {
        if request.card_uri.trim().is_empty() {
            return Err(ValidationError::MissingPollCardUri.into());
        }
        if request.card_name.trim().is_empty() {
            return Err(ValidationError::MissingPollCardName.into());
        }
        let endpoint = resolve_poll_endpoint(&request.endpoint, &self.headers.origin())?;

        let mut headers = self.headers.build_graphql_headers(None);
        headers.insert("content-type".into(), "application/x-www-form-urlencoded".into());
        headers.remove("x-client-transaction-id");
        headers.remove("x-xp-forwarded-for");

        let http_request = HttpRequest::new(Method::POST, endpoint)
            .headers(headers)
            .text(poll_form_body(request));
        let response = self.send(http_request, "poll vote").await?;
        if response.content_type().to_ascii_lowercase().contains("json") {
            response.json()
        } else {
            Ok(Value::String(response.body))
        }
    }

    pub async fn perform_friendship(&self, request: &FriendshipRequest) -> Result<Value, ReplayError> {
        let path = friendship_path(request.action);
        let mut headers = self.headers.build_graphql_headers(None);
        headers.insert(
            "content-type".into(),
            "application/x-www-form-urlencoded; charset=UTF-8".into(),
        );
        headers.insert("accept".into(), "application/json, text/plain, */*".into());
        self.sign(&mut headers, &Method::POST, path);

        let url = self.resolve(path)?;
        let http_request = HttpRequest::new(Method::POST, url.as_str())
            .headers(headers)
            .text(request.body.clone());
        self.send(http_request, request.action.as_str()).await?.json()
    }

    pub async fn perform_following_list(
        &self,
        request: &FollowingListRequest,
    ) -> Result<Value, ReplayError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::MissingUserId.into());
        }
        let count = request.count.unwrap_or(DEFAULT_FOLLOWING_COUNT).max(1);
        let cursor = request
            .cursor
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("-1");

        let mut url = self.resolve(FOLLOWING_LIST_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(DEFAULT_USER_PARAMS);
            query
                .append_pair("with_total_count", "true")
                .append_pair("user_id", user_id)
                .append_pair("count", &count.to_string())
                .append_pair("cursor", cursor);
        }

        let mut headers = self.headers.build_graphql_headers(None);
        self.sign(&mut headers, &Method::GET, FOLLOWING_LIST_PATH);
        let http_request = HttpRequest::new(Method::GET, url.as_str()).headers(headers);
        self.send(http_request, "following list").await?.json()
    }
}
