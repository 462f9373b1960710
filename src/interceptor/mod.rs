//! Page-realm network layer: observes whitelisted GraphQL traffic, keeps the
//! freshest replay headers and templates, and serves replay requests that
//! arrive over the bridge.

pub mod detail;
pub mod headers;
pub mod http;
pub mod replay;
pub mod service;
pub mod signer;
pub mod social;
pub mod upload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bridge::message::TIMELINE_UPDATE;
use crate::bridge::BridgeEndpoint;
use crate::error::ReplayError;
use detail::DetailTemplateStore;
use headers::HeaderState;
use http::{CapturedRequest, HttpClient, HttpRequest, HttpResponse};

pub use headers::PageContext;
pub use replay::Replayer;
pub use service::InterceptorService;
pub use signer::{Sha256Signer, TransactionSigner};
pub use upload::{MediaUploadResult, UploadConfig, UploadPhase, UploadProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRoute {
    HomeTimeline,
    SearchTimeline,
    HomeLatestTimeline,
    UserTweets,
    TweetDetail,
}

impl CaptureRoute {
    pub fn is_timeline(self) -> bool {
        !matches!(self, CaptureRoute::TweetDetail)
    }
}

static WHITELIST: LazyLock<Vec<(Regex, CaptureRoute)>> = LazyLock::new(|| {
    [
        (r"(?i)/i/api/graphql/[^/]+/HomeTimeline", CaptureRoute::HomeTimeline),
        (r"(?i)/i/api/graphql/[^/]+/SearchTimeline", CaptureRoute::SearchTimeline),
        (r"(?i)/i/api/graphql/[^/]+/HomeLatestTimeline", CaptureRoute::HomeLatestTimeline),
        (r"(?i)/i/api/graphql/[^/]+/UserTweets", CaptureRoute::UserTweets),
        (r"(?i)/i/api/graphql/[^/]+/TweetDetail", CaptureRoute::TweetDetail),
    ]
    .into_iter()
    .map(|(pattern, route)| (Regex::new(pattern).expect("valid whitelist regex"), route))
    .collect()
});

/// First whitelist route matching `url`.
pub fn match_route(url: &str) -> Option<CaptureRoute> {
    WHITELIST
        .iter()
        .find(|(regex, _)| regex.is_match(url))
        .map(|(_, route)| *route)
}

/// What a whitelisted response hands to its route.
#[derive(Debug, Clone)]
pub struct InterceptedPayload {
    pub response: Value,
    pub request: CapturedRequest,
    pub raw: String,
}

pub struct Interceptor {
    installed: AtomicBool,
    endpoint: Arc<BridgeEndpoint>,
    headers: Arc<HeaderState>,
    templates: Arc<DetailTemplateStore>,
}

impl Interceptor {
    pub fn new(
        endpoint: Arc<BridgeEndpoint>,
        headers: Arc<HeaderState>,
        templates: Arc<DetailTemplateStore>,
    ) -> Self {
        Self {
            installed: AtomicBool::new(false),
            endpoint,
            headers,
            templates,
        }
    }

    /// Start observing. Only the first call does anything.
    pub fn install(&self) -> bool {
        let first = !self.installed.swap(true, Ordering::SeqCst);
        if first {
            info!("network interceptor installed");
        }
        first
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Inspect one completed page request. Returns the route it matched.
    pub fn observe(&self, request: &HttpRequest, response: &HttpResponse) -> Option<CaptureRoute> {
        if !self.is_installed() || !response.is_success() {
            return None;
        }
        let route = match_route(&request.url)?;
        let payload = InterceptedPayload {
            response: response.body_value(),
            request: CapturedRequest::from_request(request),
            raw: response.body.clone(),
        };
        self.headers.set_latest(payload.request.headers.clone());
        self.handle(route, payload);
        Some(route)
    }

    fn handle(&self, route: CaptureRoute, payload: InterceptedPayload) {
        if route.is_timeline() {
            debug!("forwarding {:?} response ({} bytes)", route, payload.raw.len());
            self.endpoint.send(
                TIMELINE_UPDATE,
                json!({"response": payload.response, "request": payload.request}),
            );
        } else {
            self.templates.update(&payload.request, &self.headers.origin());
        }
    }
}

/// The page's own HTTP client with the interceptor spliced in.
pub struct PageClient {
    inner: Arc<dyn HttpClient>,
    interceptor: Arc<Interceptor>,
}

impl PageClient {
    pub fn new(inner: Arc<dyn HttpClient>, interceptor: Arc<Interceptor>) -> Self {
        Self { inner, interceptor }
    }
}

#[async_trait]
impl HttpClient for PageClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ReplayError> {
        let observed = self.interceptor.is_installed().then(|| request.clone());
        let response = self.inner.execute(request).await?;
        if let Some(request) = observed {
            self.interceptor.observe(&request, &response);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::message::Direction;
    use crate::bridge::{MessageBus, PostedMessage, WindowId};
    use crate::interceptor::http::HeaderMap;
    use crate::interceptor::replay::fake::ScriptedHttp;
    use reqwest::Method;

    struct Fixture {
        interceptor: Arc<Interceptor>,
        headers: Arc<HeaderState>,
        templates: Arc<DetailTemplateStore>,
        rx: tokio::sync::broadcast::Receiver<PostedMessage>,
    }

    fn fixture() -> Fixture {
        let bus = MessageBus::default();
        let rx = bus.subscribe();
        let endpoint = Arc::new(BridgeEndpoint::new(bus, WindowId(1), Direction::FromInterceptor));
        let headers = Arc::new(HeaderState::default());
        let templates = Arc::new(DetailTemplateStore::new());
        let interceptor = Arc::new(Interceptor::new(endpoint, headers.clone(), templates.clone()));
        Fixture {
            interceptor,
            headers,
            templates,
            rx,
        }
    }

    fn page_request(url: &str) -> HttpRequest {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization".into(), "Bearer page".into());
        headers.insert("Content-Length".into(), "0".into());
        HttpRequest::new(Method::GET, url).headers(headers)
    }

    fn ok_json(body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".into(), "application/json".into());
        HttpResponse {
            status: 200,
            headers,
            body: body.into(),
        }
    }

    #[test]
    fn test_whitelist_routes() {
        assert_eq!(
            match_route("https://x.com/i/api/graphql/abc/HomeTimeline?variables=%7B%7D"),
            Some(CaptureRoute::HomeTimeline)
        );
        assert_eq!(
            match_route("https://x.com/i/api/graphql/abc/homelatesttimeline"),
            Some(CaptureRoute::HomeLatestTimeline)
        );
        assert_eq!(
            match_route("/i/api/graphql/abc/TweetDetail"),
            Some(CaptureRoute::TweetDetail)
        );
        assert_eq!(match_route("https://x.com/i/api/graphql/abc/Likes"), None);
        assert!(!CaptureRoute::TweetDetail.is_timeline());
    }

    #[test]
    fn test_install_is_idempotent() {
        let fx = fixture();
        assert!(fx.interceptor.install());
        assert!(!fx.interceptor.install());
        assert!(fx.interceptor.is_installed());
    }

    #[test]
    fn test_nothing_observed_before_install() {
        let fx = fixture();
        let request = page_request("https://x.com/i/api/graphql/a/HomeTimeline");
        assert_eq!(fx.interceptor.observe(&request, &ok_json("{}")), None);
        assert!(fx.headers.latest().is_none());
    }

    #[test]
    fn test_timeline_is_forwarded_with_sanitised_request() {
        let mut fx = fixture();
        fx.interceptor.install();
        let request = page_request("https://x.com/i/api/graphql/a/UserTweets");
        let route = fx.interceptor.observe(&request, &ok_json(r#"{"data":{"user":{}}}"#));
        assert_eq!(route, Some(CaptureRoute::UserTweets));

        let posted = fx.rx.try_recv().unwrap();
        assert_eq!(posted.data["type"], TIMELINE_UPDATE);
        assert_eq!(posted.data["direction"], "from-interceptor");
        let payload = &posted.data["payload"];
        assert!(payload["response"]["data"]["user"].is_object());
        assert_eq!(payload["request"]["headers"]["authorization"], "Bearer page");
        assert!(payload["request"]["headers"].get("content-length").is_none());
        assert_eq!(fx.headers.latest().unwrap()["authorization"], "Bearer page");
    }

    #[test]
    fn test_detail_route_captures_template_only() {
        let mut fx = fixture();
        fx.interceptor.install();
        let request = page_request("https://x.com/i/api/graphql/NEW/TweetDetail?variables=%7B%7D");
        fx.interceptor.observe(&request, &ok_json("{}"));
        assert!(fx.templates.is_captured());
        assert_eq!(
            fx.templates.current().url,
            "https://x.com/i/api/graphql/NEW/TweetDetail"
        );
        assert!(fx.rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_responses_are_ignored() {
        let mut fx = fixture();
        fx.interceptor.install();
        let mut response = ok_json("{}");
        response.status = 500;
        let request = page_request("https://x.com/i/api/graphql/a/HomeTimeline");
        assert_eq!(fx.interceptor.observe(&request, &response), None);
        assert!(fx.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_page_client_passes_through_and_observes() {
        let mut fx = fixture();
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, serde_json::json!({"data": {}}));
        http.push_json(200, serde_json::json!({"data": {}}));
        let client = PageClient::new(http.clone(), fx.interceptor.clone());

        let url = "https://x.com/i/api/graphql/a/SearchTimeline";
        client.execute(page_request(url)).await.unwrap();
        assert!(fx.rx.try_recv().is_err());

        fx.interceptor.install();
        let response = client.execute(page_request(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(fx.rx.try_recv().is_ok());
        assert_eq!(http.requests.lock().len(), 2);
    }
}
