use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::http::HeaderMap;

const IGNORED_HEADERS: [&str; 4] = ["content-length", "host", "origin", "referer"];

const GLOBAL_TOKEN_PATHS: [&str; 6] = [
    "/__INITIAL_STATE__/session/bearerToken",
    "/__INITIAL_STATE__/config/bearerToken",
    "/__INITIAL_DATA__/session/bearerToken",
    "/__INITIAL_DATA__/config/bearerToken",
    "/__NEXT_DATA__/props/pageProps/apollo/session/bearerToken",
    "/__NEXT_DATA__/props/pageProps/session/bearerToken",
];

/// Lowercase header names and drop the ones a replay must not carry.
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
        .filter(|(key, _)| !IGNORED_HEADERS.contains(&key.as_str()))
        .collect()
}

pub fn normalize_authorization(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with("Bearer ") {
        Some(value.to_string())
    } else {
        Some(format!("Bearer {}", value))
    }
}

/// Value of cookie `name` in a `document.cookie` style string.
pub fn cookie_value(cookie: &str, name: &str) -> Option<String> {
    cookie.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
    })
}

/// What the page realm exposes that header construction can read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    pub origin: String,
    pub document_language: Option<String>,
    pub languages: Vec<String>,
    pub cookie: String,
    /// Page globals such as `__INITIAL_STATE__`, keyed by name.
    pub globals: Value,
    pub local_storage: Vec<(String, String)>,
    pub session_storage: Vec<(String, String)>,
}

impl PageContext {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    fn client_language(&self) -> String {
        self.document_language
            .iter()
            .chain(self.languages.first())
            .find(|lang| !lang.is_empty())
            .cloned()
            .unwrap_or_else(|| "en".to_string())
    }

    fn accept_language(&self) -> String {
        let joined = self
            .languages
            .iter()
            .filter(|lang| !lang.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        if joined.is_empty() {
            "en-US".to_string()
        } else {
            joined
        }
    }

    fn authorization_from_globals(&self) -> Option<String> {
        GLOBAL_TOKEN_PATHS
            .iter()
            .filter_map(|path| self.globals.pointer(path).and_then(Value::as_str))
            .find_map(|token| normalize_authorization(Some(token)))
    }
}

/// Only values that look like a bearer token, directly or as JSON holding
/// `bearerToken`, are taken from page storage.
fn authorization_from_storage(storage: &[(String, String)]) -> Option<String> {
    storage.iter().find_map(|(key, raw)| {
        let raw = raw.trim();
        if raw.starts_with("Bearer ") {
            return Some(raw.to_string());
        }
        if !raw.contains("bearerToken") {
            return None;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed
                .get("bearerToken")
                .or_else(|| parsed.pointer("/session/bearerToken"))
                .and_then(Value::as_str)
                .and_then(|token| normalize_authorization(Some(token))),
            Err(err) => {
                warn!("storage item {} mentions bearerToken but is not JSON: {}", key, err);
                None
            }
        }
    })
}

/// Freshest headers observed on page traffic plus the page context used to
/// fill the gaps.
pub struct HeaderState {
    latest: RwLock<Option<HeaderMap>>,
    page: RwLock<PageContext>,
}

impl HeaderState {
    pub fn new(page: PageContext) -> Self {
        Self {
            latest: RwLock::new(None),
            page: RwLock::new(page),
        }
    }

    pub fn set_latest(&self, headers: HeaderMap) {
        debug!("captured {} replay headers", headers.len());
        *self.latest.write() = Some(headers);
    }

    pub fn latest(&self) -> Option<HeaderMap> {
        self.latest.read().clone()
    }

    pub fn origin(&self) -> String {
        self.page.read().origin.clone()
    }

    pub fn update_page<F: FnOnce(&mut PageContext)>(&self, update: F) {
        update(&mut self.page.write());
    }

    /// Headers for a replayed request.
    ///
    /// The template, then the latest capture, then the `ct0` cookie are merged
    /// in that order; defaults only fill keys that are still missing.
    pub fn build_graphql_headers(&self, template: Option<&HeaderMap>) -> HeaderMap {
        let latest = self.latest.read().clone();
        let page = self.page.read();
        let mut headers = HeaderMap::new();

        for source in [template, latest.as_ref()].into_iter().flatten() {
            for (key, value) in source {
                if key.is_empty() || value.is_empty() {
                    continue;
                }
                headers.insert(key.to_ascii_lowercase(), value.clone());
            }
        }

        if let Some(csrf) = cookie_value(&page.cookie, "ct0") {
            headers.insert("x-csrf-token".into(), csrf);
        }

        headers
            .entry("x-twitter-active-user".into())
            .or_insert_with(|| "yes".into());
        headers
            .entry("x-twitter-client-language".into())
            .or_insert_with(|| page.client_language());
        headers
            .entry("accept-language".into())
            .or_insert_with(|| page.accept_language());
        headers.entry("accept".into()).or_insert_with(|| "*/*".into());

        let authorization = normalize_authorization(headers.get("authorization").map(String::as_str))
            .or_else(|| {
                normalize_authorization(
                    latest
                        .as_ref()
                        .and_then(|h| h.get("authorization"))
                        .map(String::as_str),
                )
            })
            .or_else(|| {
                normalize_authorization(
                    template
                        .and_then(|h| h.get("authorization"))
                        .map(String::as_str),
                )
            })
            .or_else(|| page.authorization_from_globals())
            .or_else(|| authorization_from_storage(&page.local_storage))
            .or_else(|| authorization_from_storage(&page.session_storage));

        match authorization {
            Some(value) => {
                headers.insert("authorization".into(), value);
            }
            None => warn!("no authorization header could be resolved for replay"),
        }

        headers
            .entry("x-twitter-auth-type".into())
            .or_insert_with(|| "OAuth2Session".into());
        headers
            .entry("content-type".into())
            .or_insert_with(|| "application/json".into());
        headers
    }
}

impl Default for HeaderState {
    fn default() -> Self {
        Self::new(PageContext::new("https://x.com"))
    }
}
