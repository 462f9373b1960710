use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use super::detail::DetailTemplateStore;
use super::headers::HeaderState;
use super::http::{HeaderMap, HttpClient, HttpRequest, HttpResponse};
use super::signer::{signing_path, TransactionSigner};
use crate::bridge::message::ActionRequest;
use crate::error::ReplayError;

const TRANSACTION_HEADER: &str = "x-client-transaction-id";

/// Replays authenticated calls from the page realm using the headers and
/// templates captured off live traffic.
#[derive(Clone)]
pub struct Replayer {
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) headers: Arc<HeaderState>,
    pub(crate) templates: Arc<DetailTemplateStore>,
    pub(crate) signer: Arc<dyn TransactionSigner>,
}

impl Replayer {
    pub fn new(
        http: Arc<dyn HttpClient>,
        headers: Arc<HeaderState>,
        templates: Arc<DetailTemplateStore>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            http,
            headers,
            templates,
            signer,
        }
    }

    pub fn header_state(&self) -> &Arc<HeaderState> {
        &self.headers
    }

    /// `path` resolved against the page origin; absolute urls pass through.
    pub(crate) fn resolve(&self, path: &str) -> Result<Url, ReplayError> {
        let origin = Url::parse(&self.headers.origin())?;
        Ok(origin.join(path)?)
    }

    pub(crate) fn sign(&self, headers: &mut HeaderMap, method: &Method, path: &str) {
        let token = self
            .signer
            .transaction_id(method.as_str(), signing_path(path));
        headers.insert(TRANSACTION_HEADER.into(), token);
    }

    pub(crate) async fn send(
        &self,
        request: HttpRequest,
        operation: &str,
    ) -> Result<HttpResponse, ReplayError> {
        debug!("replaying {} {}", request.method, request.url);
        self.http.execute(request).await?.ensure_success(operation)
    }

    /// Replay `TweetDetail` for `tweet_id` through the current template.
    pub async fn perform_detail(
        &self,
        tweet_id: &str,
        controller_data: Option<&str>,
    ) -> Result<Value, ReplayError> {
        let template = self.templates.current();
        let variables = template.variables_for(tweet_id, controller_data);
        let headers = self.headers.build_graphql_headers(Some(&template.headers));

        let request = if template.method == Method::GET {
            let mut url = self.resolve(&template.url)?;
            url.query_pairs_mut()
                .append_pair("variables", &Value::Object(variables).to_string())
                .append_pair("features", &Value::Object(template.features).to_string())
                .append_pair(
                    "fieldToggles",
                    &Value::Object(template.field_toggles).to_string(),
                );
            HttpRequest::new(Method::GET, url.as_str()).headers(headers)
        } else {
            let url = self.resolve(&template.url)?;
            let body = json!({
                "variables": variables,
                "features": template.features,
                "fieldToggles": template.field_toggles,
            });
            HttpRequest::new(template.method, url.as_str())
                .headers(headers)
                .text(body.to_string())
        };

        self.send(request, "TweetDetail").await?.json()
    }

    /// Replay a GraphQL query or mutation by document id.
    pub async fn perform_action(&self, action: &ActionRequest) -> Result<Value, ReplayError> {
        let method = match action.method.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("GET") => Method::GET,
            _ => Method::POST,
        };
        let path = format!("/i/api/graphql/{}/{}", action.doc_id, action.operation_name);
        let mut url = self.resolve(&path)?;
        let mut headers = self.headers.build_graphql_headers(None);
        self.sign(&mut headers, &method, &path);

        let non_empty = |map: &Option<Map<String, Value>>| {
            map.as_ref().filter(|m| !m.is_empty()).cloned()
        };

        let request = if method == Method::GET {
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("variables", &Value::Object(action.variables.clone()).to_string());
                if let Some(features) = non_empty(&action.features) {
                    query.append_pair("features", &Value::Object(features).to_string());
                }
                if let Some(toggles) = non_empty(&action.field_toggles) {
                    query.append_pair("fieldToggles", &Value::Object(toggles).to_string());
                }
            }
            HttpRequest::new(Method::GET, url.as_str()).headers(headers)
        } else {
            let mut body = json!({
                "variables": action.variables,
                "queryId": action.doc_id,
                "queryName": action.operation_name,
                "operationName": action.operation_name,
            });
            if let Some(features) = &action.features {
                body["features"] = Value::Object(features.clone());
            }
            if let Some(toggles) = &action.field_toggles {
                body["fieldToggles"] = Value::Object(toggles.clone());
            }
            HttpRequest::new(Method::POST, url.as_str())
                .headers(headers)
                .text(body.to_string())
        };

        self.send(request, &action.operation_name).await?.json()
    }
}
