use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::bridge::{BridgeEndpoint, Direction, MessageBus, WindowId};
use crate::client::ContentClient;
use crate::config::Config;
use crate::error::ReplayError;
use crate::interceptor::detail::DetailTemplateStore;
use crate::interceptor::headers::HeaderState;
use crate::interceptor::http::{HttpClient, ReqwestClient};
use crate::interceptor::{Interceptor, InterceptorService, PageClient, Replayer, Sha256Signer};
use crate::snapshot::SidebarController;
use crate::store::{DetailCache, TweetStore};

const SESSION_WINDOW: WindowId = WindowId(1);

/// Both realms of one tab wired onto a shared bus.
///
/// The page side observes traffic through [`PageClient`] and answers bridge
/// requests; the content side owns the caches and the sidebar. Listener tasks
/// are aborted when the session is dropped.
pub struct Session {
    pub bus: MessageBus,
    pub store: Arc<TweetStore>,
    pub client: Arc<ContentClient>,
    pub sidebar: Arc<SidebarController>,
    pub interceptor: Arc<Interceptor>,
    pub page_client: Arc<PageClient>,
    pub service: Arc<InterceptorService>,
    listeners: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start with a real HTTP client. Must be called inside a tokio runtime.
    pub fn start(config: &Config) -> Result<Self, ReplayError> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(Some(ReqwestClient::DEFAULT_TIMEOUT))?);
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        let bus = MessageBus::default();

        let page_endpoint = Arc::new(BridgeEndpoint::new(
            bus.clone(),
            SESSION_WINDOW,
            Direction::FromInterceptor,
        ));
        let headers = Arc::new(HeaderState::new(config.to_page_context()));
        let templates = Arc::new(DetailTemplateStore::new());
        let interceptor = Arc::new(Interceptor::new(
            Arc::clone(&page_endpoint),
            Arc::clone(&headers),
            Arc::clone(&templates),
        ));
        interceptor.install();
        let page_client = Arc::new(PageClient::new(Arc::clone(&http), Arc::clone(&interceptor)));

        // Replays go out on the raw client so they are never re-observed.
        let replayer = Replayer::new(http, headers, templates, Arc::new(Sha256Signer::new()));
        let service = InterceptorService::new(
            Arc::clone(&page_endpoint),
            replayer,
            config.to_upload_config(),
        );
        service.register();

        let content_endpoint = Arc::new(BridgeEndpoint::new(
            bus.clone(),
            SESSION_WINDOW,
            Direction::ToInterceptor,
        ));
        let store = Arc::new(TweetStore::new());
        let client = Arc::new(
            ContentClient::new(
                Arc::clone(&content_endpoint),
                Arc::clone(&store),
                Arc::new(DetailCache::default()),
            )
            .with_request_timeout(config.request_timeout()),
        );
        client.connect();
        let sidebar = SidebarController::new(Arc::clone(&client));

        let listeners = vec![page_endpoint.spawn(), content_endpoint.spawn()];
        debug!("session started for {}", config.page.origin);

        Self {
            bus,
            store,
            client,
            sidebar,
            interceptor,
            page_client,
            service,
            listeners,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::http::HttpRequest;
    use crate::interceptor::replay::fake::ScriptedHttp;
    use crate::store::fixtures::tweet;
    use crate::store::timeline::fixtures::{conversation, item_entry};
    use reqwest::Method;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_builds_real_client() {
        let session = Session::start(&Config::default()).unwrap();
        assert!(session.client.details().get("1").is_none());
    }

    #[tokio::test]
    async fn test_observed_timeline_reaches_content_store() {
        let http = Arc::new(ScriptedHttp::default());
        let session = Session::with_http(&Config::default(), http.clone());
        let body = conversation(vec![item_entry("tweet-4", tweet("4", "a", None), None)]);
        http.push_json(200, body);

        let request = HttpRequest::new(
            Method::GET,
            "https://x.com/i/api/graphql/abc/HomeTimeline?variables=%7B%7D",
        );
        session.page_client.execute(request).await.unwrap();

        for _ in 0..50 {
            if session.store.contains("4") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.store.contains("4"));
    }

    #[tokio::test]
    async fn test_detail_round_trip_through_both_realms() {
        let http = Arc::new(ScriptedHttp::default());
        let session = Session::with_http(&Config::default(), http.clone());
        let body = conversation(vec![
            item_entry("tweet-1", tweet("1", "a", None), None),
            item_entry("tweet-2", tweet("2", "b", Some("1")), None),
        ]);
        http.push_json(200, body);

        session.client.request_tweet_detail("1", None, false).await.unwrap();
        assert!(session.store.contains("2"));
        assert!(http.request(0).url.contains("TweetDetail"));
    }
}
