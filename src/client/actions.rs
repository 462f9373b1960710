use serde_json::{json, Map, Value};

use super::ContentClient;
use crate::bridge::create_request_id;
use crate::bridge::message::{ActionRequest, ACTION_REQUEST};
use crate::error::{BridgeError, ValidationError};
use crate::interceptor::detail::TWEET_DETAIL_DOC_ID;

/// GraphQL operations the sidebar knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOperation {
    TweetDetail,
    TweetResultByRestId,
    CreateTweet,
    FavoriteTweet,
    UnfavoriteTweet,
    CreateRetweet,
    DeleteRetweet,
    CreateBookmark,
    DeleteBookmark,
}

impl ActionOperation {
    pub fn doc_id(self) -> &'static str {
        match self {
            ActionOperation::TweetDetail => TWEET_DETAIL_DOC_ID,
            ActionOperation::TweetResultByRestId => "URPP6YZ5eDCjdVMSREn4gg",
            ActionOperation::CreateTweet => "ZSBCfCefJFumbPcLcwR64Q",
            ActionOperation::FavoriteTweet => "lI07N6Otwv1PhnEgXILM7A",
            ActionOperation::UnfavoriteTweet => "ZYKSe-w7KEslx3JhSIk5LA",
            ActionOperation::CreateRetweet => "ojPdsZsimiJrUGLR1sjUtA",
            ActionOperation::DeleteRetweet => "iQtK4dl5hBmXewYZuEOKVw",
            ActionOperation::CreateBookmark => "aoDbu3RHznuiSkQ9aNM67Q",
            ActionOperation::DeleteBookmark => "Wlmlj2-xzyS1GN3a6cj-mQ",
        }
    }

    pub fn operation_name(self) -> &'static str {
        match self {
            ActionOperation::TweetDetail => "TweetDetail",
            ActionOperation::TweetResultByRestId => "TweetResultByRestId",
            ActionOperation::CreateTweet => "CreateTweet",
            ActionOperation::FavoriteTweet => "FavoriteTweet",
            ActionOperation::UnfavoriteTweet => "UnfavoriteTweet",
            ActionOperation::CreateRetweet => "CreateRetweet",
            ActionOperation::DeleteRetweet => "DeleteRetweet",
            ActionOperation::CreateBookmark => "CreateBookmark",
            ActionOperation::DeleteBookmark => "DeleteBookmark",
        }
    }

    pub fn default_method(self) -> &'static str {
        match self {
            ActionOperation::TweetResultByRestId => "GET",
            _ => "POST",
        }
    }

    fn request_prefix(self) -> &'static str {
        match self {
            ActionOperation::TweetDetail => "tweet_detail",
            ActionOperation::TweetResultByRestId => "tweet_result_by_rest_id",
            ActionOperation::CreateTweet => "create_tweet",
            ActionOperation::FavoriteTweet => "favorite",
            ActionOperation::UnfavoriteTweet => "unfavorite",
            ActionOperation::CreateRetweet => "retweet",
            ActionOperation::DeleteRetweet => "unretweet",
            ActionOperation::CreateBookmark => "bookmark",
            ActionOperation::DeleteBookmark => "unbookmark",
        }
    }
}

const REST_ID_FEATURES: &[(&str, bool)] = &[
    ("creator_subscriptions_tweet_preview_api_enabled", true),
    ("premium_content_api_read_enabled", false),
    ("communities_web_enable_tweet_community_results_fetch", true),
    ("c9s_tweet_anatomy_moderator_badge_enabled", true),
    ("responsive_web_grok_analyze_button_fetch_trends_enabled", false),
    ("responsive_web_grok_analyze_post_followups_enabled", true),
    ("responsive_web_jetfuel_frame", true),
    ("responsive_web_grok_share_attachment_enabled", true),
    ("articles_preview_enabled", true),
    ("responsive_web_edit_tweet_api_enabled", true),
    ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
    ("view_counts_everywhere_api_enabled", true),
    ("longform_notetweets_consumption_enabled", true),
    ("responsive_web_twitter_article_tweet_consumption_enabled", true),
    ("tweet_awards_web_tipping_enabled", false),
    ("responsive_web_grok_show_grok_translated_post", false),
    ("responsive_web_grok_analysis_button_from_backend", true),
    ("creator_subscriptions_quote_tweet_preview_enabled", false),
    ("freedom_of_speech_not_reach_fetch_enabled", true),
    ("standardized_nudges_misinfo", true),
    ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
    ("longform_notetweets_rich_text_read_enabled", true),
    ("longform_notetweets_inline_media_enabled", true),
    ("payments_enabled", false),
    ("profile_label_improvements_pcf_label_in_post_enabled", true),
    ("rweb_tipjar_consumption_enabled", true),
    ("verified_phone_label_enabled", false),
    ("responsive_web_grok_image_annotation_enabled", true),
    ("responsive_web_grok_imagine_annotation_enabled", true),
    ("responsive_web_grok_community_note_auto_translation_is_enabled", false),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
    ("responsive_web_enhance_cards_enabled", false),
];

const REST_ID_FIELD_TOGGLES: &[(&str, bool)] = &[
    ("withArticleRichContentState", true),
    ("withArticlePlainText", false),
];

/// Feature switches the web client sends with CreateTweet.
const MUTATION_FEATURES: &[(&str, bool)] = &[
    ("premium_content_api_read_enabled", false),
    ("communities_web_enable_tweet_community_results_fetch", true),
    ("c9s_tweet_anatomy_moderator_badge_enabled", true),
    ("responsive_web_grok_analyze_button_fetch_trends_enabled", false),
    ("responsive_web_grok_analyze_post_followups_enabled", true),
    ("responsive_web_jetfuel_frame", true),
    ("responsive_web_grok_share_attachment_enabled", true),
    ("responsive_web_edit_tweet_api_enabled", true),
    ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
    ("view_counts_everywhere_api_enabled", true),
    ("longform_notetweets_consumption_enabled", true),
    ("responsive_web_twitter_article_tweet_consumption_enabled", true),
    ("tweet_awards_web_tipping_enabled", false),
    ("responsive_web_grok_show_grok_translated_post", false),
    ("responsive_web_grok_analysis_button_from_backend", true),
    ("creator_subscriptions_quote_tweet_preview_enabled", false),
    ("longform_notetweets_rich_text_read_enabled", true),
    ("longform_notetweets_inline_media_enabled", true),
    ("payments_enabled", false),
    ("profile_label_improvements_pcf_label_in_post_enabled", true),
    ("rweb_tipjar_consumption_enabled", true),
    ("verified_phone_label_enabled", false),
    ("articles_preview_enabled", true),
    ("responsive_web_grok_community_note_auto_translation_is_enabled", false),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("freedom_of_speech_not_reach_fetch_enabled", true),
    ("standardized_nudges_misinfo", true),
    ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
    ("responsive_web_grok_image_annotation_enabled", true),
    ("responsive_web_grok_imagine_annotation_enabled", true),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
    ("responsive_web_enhance_cards_enabled", false),
];

fn flag_map(flags: &[(&str, bool)]) -> Map<String, Value> {
    flags
        .iter()
        .map(|(key, value)| (key.to_string(), Value::Bool(*value)))
        .collect()
}

/// Optional knobs for [`ContentClient::create_reply`].
#[derive(Debug, Clone)]
pub struct ReplyOptions {
    pub exclude_reply_user_ids: Vec<String>,
    pub batch_compose: String,
    pub dark_request: bool,
    /// `(media_id, tagged_user_ids)` pairs from earlier uploads.
    pub media: Vec<(String, Vec<String>)>,
    pub possibly_sensitive: bool,
    pub semantic_annotation_ids: Vec<String>,
    pub disallowed_reply_options: Value,
    pub features_override: Map<String, Value>,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            exclude_reply_user_ids: Vec::new(),
            batch_compose: "BatchSubsequent".to_string(),
            dark_request: false,
            media: Vec::new(),
            possibly_sensitive: false,
            semantic_annotation_ids: Vec::new(),
            disallowed_reply_options: Value::Null,
            features_override: Map::new(),
        }
    }
}

/// Variables for a CreateTweet reply to `tweet_id`.
pub fn reply_variables(tweet_id: &str, text: &str, options: &ReplyOptions) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("tweet_text".into(), json!(text));
    variables.insert("batch_compose".into(), json!(options.batch_compose));
    variables.insert("dark_request".into(), json!(options.dark_request));
    variables.insert(
        "semantic_annotation_ids".into(),
        json!(options.semantic_annotation_ids),
    );
    variables.insert(
        "disallowed_reply_options".into(),
        options.disallowed_reply_options.clone(),
    );
    if !options.media.is_empty() || options.possibly_sensitive {
        let entities: Vec<Value> = options
            .media
            .iter()
            .map(|(media_id, tagged)| json!({"media_id": media_id, "tagged_users": tagged}))
            .collect();
        variables.insert(
            "media".into(),
            json!({"media_entities": entities, "possibly_sensitive": options.possibly_sensitive}),
        );
    }
    variables.insert(
        "reply".into(),
        json!({
            "in_reply_to_tweet_id": tweet_id,
            "exclude_reply_user_ids": options.exclude_reply_user_ids,
        }),
    );
    variables
}

fn tweet_variables(tweet_id: &str, dark_request: Option<bool>) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("tweet_id".into(), json!(tweet_id));
    if let Some(dark) = dark_request {
        variables.insert("dark_request".into(), json!(dark));
    }
    variables
}

impl ContentClient {
    /// Replay one registered GraphQL operation through the page realm.
    pub async fn send_action(
        &self,
        operation: ActionOperation,
        variables: Map<String, Value>,
        features: Option<Map<String, Value>>,
        field_toggles: Option<Map<String, Value>>,
    ) -> Result<Value, BridgeError> {
        let request = ActionRequest {
            request_id: create_request_id(operation.request_prefix()),
            doc_id: operation.doc_id().to_string(),
            operation_name: operation.operation_name().to_string(),
            variables,
            features,
            method: Some(operation.default_method().to_string()),
            field_toggles,
        };
        self.round_trip(&self.action_pending, ACTION_REQUEST, &request.request_id, &request)
            .await
    }

    /// Reply to `tweet_id`. Blank text is rejected before anything is sent.
    pub async fn create_reply(
        &self,
        tweet_id: &str,
        text: &str,
        options: ReplyOptions,
    ) -> Result<Value, BridgeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyReplyText.into());
        }
        let mut features = flag_map(MUTATION_FEATURES);
        features.extend(options.features_override.clone());
        let variables = reply_variables(tweet_id, text, &options);
        self.send_action(ActionOperation::CreateTweet, variables, Some(features), None)
            .await
    }

    pub async fn favorite_tweet(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(ActionOperation::FavoriteTweet, tweet_variables(tweet_id, None), None, None)
            .await
    }

    pub async fn unfavorite_tweet(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(
            ActionOperation::UnfavoriteTweet,
            tweet_variables(tweet_id, None),
            None,
            None,
        )
        .await
    }

    pub async fn create_retweet(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(
            ActionOperation::CreateRetweet,
            tweet_variables(tweet_id, Some(false)),
            None,
            None,
        )
        .await
    }

    pub async fn delete_retweet(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(
            ActionOperation::DeleteRetweet,
            tweet_variables(tweet_id, Some(false)),
            None,
            None,
        )
        .await
    }

    pub async fn create_bookmark(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(ActionOperation::CreateBookmark, tweet_variables(tweet_id, None), None, None)
            .await
    }

    pub async fn delete_bookmark(&self, tweet_id: &str) -> Result<Value, BridgeError> {
        self.send_action(ActionOperation::DeleteBookmark, tweet_variables(tweet_id, None), None, None)
            .await
    }

    /// Single tweet lookup by id, as used to refresh one card.
    pub async fn fetch_tweet_result_by_rest_id(
        &self,
        tweet_id: &str,
        controller_data: Option<&str>,
    ) -> Result<Value, BridgeError> {
        let mut variables = Map::new();
        variables.insert("tweetId".into(), json!(tweet_id));
        variables.insert("withCommunity".into(), json!(true));
        variables.insert("includePromotedContent".into(), json!(false));
        variables.insert("withQuickPromoteEligibilityTweetFields".into(), json!(true));
        variables.insert("withVoice".into(), json!(true));
        variables.insert("withBirdwatchNotes".into(), json!(true));
        variables.insert("with_rux_injections".into(), json!(false));
        if let Some(data) = controller_data.filter(|d| !d.is_empty()) {
            variables.insert("controller_data".into(), json!(data));
        }
        self.send_action(
            ActionOperation::TweetResultByRestId,
            variables,
            Some(flag_map(REST_ID_FEATURES)),
            Some(flag_map(REST_ID_FIELD_TOGGLES)),
        )
        .await
    }
}
