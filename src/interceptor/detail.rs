//! Capture and reuse of the page's own `TweetDetail` request shape.

use parking_lot::RwLock;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::warn;
use url::Url;

use super::headers::sanitize_headers;
use super::http::{CapturedRequest, HeaderMap};
use crate::error::ReplayError;

pub const TWEET_DETAIL_DOC_ID: &str = "JgryuItLZQ9V56vHjGIWWw";

const DEFAULT_FEATURES: &[(&str, bool)] = &[
    ("articles_preview_enabled", true),
    ("c9s_tweet_anatomy_moderator_badge_enabled", true),
    ("communities_web_enable_tweet_community_results_fetch", true),
    ("creator_subscriptions_quote_tweet_preview_enabled", false),
    ("creator_subscriptions_tweet_preview_api_enabled", true),
    ("freedom_of_speech_not_reach_fetch_enabled", true),
    ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
    ("interactive_text_enabled", true),
    ("longform_notetweets_consumption_enabled", true),
    ("longform_notetweets_inline_media_enabled", true),
    ("longform_notetweets_rich_text_read_enabled", true),
    ("payments_enabled", false),
    ("premium_content_api_read_enabled", false),
    ("profile_label_improvements_pcf_label_in_post_enabled", true),
    ("responsive_web_edit_tweet_api_enabled", true),
    ("responsive_web_enhance_cards_enabled", false),
    ("responsive_web_graphql_exclude_directive_enabled", true),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
    ("responsive_web_grok_analysis_button_from_backend", true),
    ("responsive_web_grok_analyze_button_fetch_trends_enabled", false),
    ("responsive_web_grok_analyze_post_followups_enabled", true),
    ("responsive_web_grok_community_note_auto_translation_is_enabled", false),
    ("responsive_web_grok_image_annotation_enabled", true),
    ("responsive_web_grok_imagine_annotation_enabled", true),
    ("responsive_web_grok_share_attachment_enabled", true),
    ("responsive_web_grok_show_grok_translated_post", false),
    ("responsive_web_jetfuel_frame", true),
    ("responsive_web_text_conversations_enabled", false),
    ("responsive_web_twitter_article_tweet_consumption_enabled", true),
    ("rweb_tipjar_consumption_enabled", true),
    ("rweb_video_screen_enabled", false),
    ("standardized_nudges_misinfo", true),
    ("tweet_awards_web_tipping_enabled", false),
    ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
    ("verified_phone_label_enabled", false),
    ("vibe_api_enabled", true),
    ("view_counts_everywhere_api_enabled", true),
];

const DEFAULT_FIELD_TOGGLES: &[(&str, bool)] = &[
    ("withArticlePlainText", false),
    ("withArticleRichContentState", true),
    ("withAuxiliaryUserLabels", false),
    ("withCategoryGoodId", false),
    ("withDisallowedReplyControls", false),
    ("withGrokAnalyze", false),
    ("withSawaraEnabled", false),
];

fn flag_map(flags: &[(&str, bool)]) -> Map<String, Value> {
    flags
        .iter()
        .map(|(key, value)| (key.to_string(), Value::Bool(*value)))
        .collect()
}

pub fn default_detail_features() -> Map<String, Value> {
    flag_map(DEFAULT_FEATURES)
}

pub fn default_detail_field_toggles() -> Map<String, Value> {
    flag_map(DEFAULT_FIELD_TOGGLES)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailTemplate {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub variables: Map<String, Value>,
    pub features: Map<String, Value>,
    pub field_toggles: Map<String, Value>,
}

impl DetailTemplate {
    /// Template used until the page has issued a `TweetDetail` of its own.
    pub fn preset() -> Self {
        let variables = json!({
            "focalTweetId": "",
            "includePromotedContent": true,
            "rankingMode": "Relevance",
            "referrer": "Home",
            "withBirdwatchNotes": true,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": true,
            "withVoice": true,
            "with_rux_injections": false
        });
        let mut headers = HeaderMap::new();
        headers.insert("accept".into(), "*/*".into());
        headers.insert("content-type".into(), "application/json".into());
        Self {
            url: format!("/i/api/graphql/{}/TweetDetail", TWEET_DETAIL_DOC_ID),
            method: Method::GET,
            headers,
            variables: match variables {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            features: default_detail_features(),
            field_toggles: default_detail_field_toggles(),
        }
    }

    /// Rebuild a template from an observed request.
    pub fn from_captured(request: &CapturedRequest, origin: &str) -> Result<Self, ReplayError> {
        let base = Url::parse(origin)?;
        let url = base.join(&request.url)?;
        let method = if request.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
                .unwrap_or(Method::GET)
        };
        let headers = sanitize_headers(&request.headers);

        if method == Method::GET {
            let param = |name: &str| -> Result<Option<Map<String, Value>>, ReplayError> {
                let Some((_, raw)) = url.query_pairs().find(|(key, _)| key == name) else {
                    return Ok(None);
                };
                Ok(serde_json::from_str::<Value>(&raw)?.as_object().cloned())
            };
            return Ok(Self {
                url: format!("{}{}", url.origin().ascii_serialization(), url.path()),
                method,
                headers,
                variables: param("variables")?.unwrap_or_default(),
                features: param("features")?.unwrap_or_else(default_detail_features),
                field_toggles: param("fieldToggles")?.unwrap_or_else(default_detail_field_toggles),
            });
        }

        let body: Value = match request.body.as_deref().filter(|b| !b.is_empty()) {
            Some(body) => serde_json::from_str(body)?,
            None => Value::Object(Map::new()),
        };
        let section = |name: &str| body.get(name).and_then(Value::as_object).cloned();
        Ok(Self {
            url: request.url.clone(),
            method,
            headers,
            variables: section("variables").unwrap_or_default(),
            features: section("features").unwrap_or_else(default_detail_features),
            field_toggles: section("fieldToggles").unwrap_or_else(default_detail_field_toggles),
        })
    }

    /// Variables for one replay: the template's own focus and controller
    /// data never leak into it.
    pub fn variables_for(&self, tweet_id: &str, controller_data: Option<&str>) -> Map<String, Value> {
        let mut variables = self.variables.clone();
        variables.remove("controller_data");
        variables.remove("focalTweetId");
        variables.insert("focalTweetId".into(), Value::String(tweet_id.to_string()));
        if let Some(data) = controller_data.filter(|data| !data.is_empty()) {
            variables.insert("controller_data".into(), Value::String(data.to_string()));
        }
        variables
    }
}

/// Latest captured template, falling back to the preset.
#[derive(Default)]
pub struct DetailTemplateStore {
    captured: RwLock<Option<DetailTemplate>>,
}

impl DetailTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the template from `request`. Unparseable requests keep the old one.
    pub fn update(&self, request: &CapturedRequest, origin: &str) -> bool {
        match DetailTemplate::from_captured(request, origin) {
            Ok(template) => {
                *self.captured.write() = Some(template);
                true
            }
            Err(err) => {
                warn!("could not parse TweetDetail template from {}: {}", request.url, err);
                false
            }
        }
    }

    pub fn current(&self) -> DetailTemplate {
        self.captured.read().clone().unwrap_or_else(DetailTemplate::preset)
    }

    pub fn is_captured(&self) -> bool {
        self.captured.read().is_some()
    }
}
