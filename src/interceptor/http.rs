//! The HTTP seam every replay goes through.
//!
//! Production code talks to the network with [`ReqwestClient`]; tests swap
//! in a scripted [`HttpClient`] so nothing leaves the process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ReplayError;

pub type HeaderMap = BTreeMap<String, String>;

static JSON_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)application/json|application/.*\+json|text/json").expect("valid content-type regex")
});

/// Multipart bodies are streamed to the transport in pieces of this size.
pub const BODY_PIECE_BYTES: usize = 256 * 1024;

/// Receives the running count of body bytes handed to the transport.
#[derive(Clone)]
pub struct ByteProgress(Arc<dyn Fn(u64) + Send + Sync>);

impl ByteProgress {
    pub fn new(report: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(report))
    }

    fn report(&self, sent: u64) {
        (self.0)(sent)
    }
}

impl fmt::Debug for ByteProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteProgress")
    }
}

impl PartialEq for ByteProgress {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub progress: Option<ByteProgress>,
}

impl MultipartFile {
    /// The file contents as a stream of pieces. `progress` sees the
    /// cumulative byte count as each piece is pulled.
    pub fn into_body_stream(self) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
        let Self {
            bytes, progress, ..
        } = self;
        let total = bytes.len();
        stream::iter((0..total).step_by(BODY_PIECE_BYTES)).map(move |start| {
            let end = (start + BODY_PIECE_BYTES).min(total);
            let piece = bytes[start..end].to_vec();
            if let Some(progress) = &progress {
                progress.report(end as u64);
            }
            Ok(piece)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    Multipart(MultipartFile),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    pub fn multipart(mut self, file: MultipartFile) -> Self {
        self.body = RequestBody::Multipart(file);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn has_json_content_type(&self) -> bool {
        JSON_CONTENT_TYPE.is_match(self.content_type())
    }

    /// Fail with the operation name when the status is outside 2xx.
    pub fn ensure_success(self, operation: &str) -> Result<Self, ReplayError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ReplayError::Status {
                operation: operation.to_string(),
                status: self.status,
            })
        }
    }

    pub fn json(&self) -> Result<Value, ReplayError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// JSON when the content type says so and it parses, the raw text otherwise.
    pub fn body_value(&self) -> Value {
        if !self.has_json_content_type() {
            return Value::String(self.body.clone());
        }
        match self.json() {
            Ok(value) => value,
            Err(err) => {
                warn!("response claimed JSON but did not parse, keeping raw text: {}", err);
                Value::String(self.body.clone())
            }
        }
    }
}

/// Request as seen by the interception layer, after header sanitising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CapturedRequest {
    pub fn from_request(request: &HttpRequest) -> Self {
        let body = match &request.body {
            RequestBody::Text(text) => Some(text.clone()),
            RequestBody::Empty | RequestBody::Multipart(_) => None,
        };
        Self {
            url: request.url.clone(),
            method: request.method.as_str().to_string(),
            headers: super::headers::sanitize_headers(&request.headers),
            body,
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ReplayError>;
}

pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Option<Duration>) -> Result<Self, ReplayError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("threadlens/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ReplayError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Multipart(file) => {
                let field = file.field.clone();
                let file_name = file.file_name.clone();
                let length = file.bytes.len() as u64;
                let body = reqwest::Body::wrap_stream(file.into_body_stream());
                let part = reqwest::multipart::Part::stream_with_length(body, length).file_name(file_name);
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let body = response.text().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: &str, body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".into(), content_type.into());
        HttpResponse {
            status: 200,
            headers,
            body: body.into(),
        }
    }

    #[test]
    fn test_json_content_types() {
        assert!(response("application/json; charset=utf-8", "{}").has_json_content_type());
        assert!(response("application/problem+json", "{}").has_json_content_type());
        assert!(response("TEXT/JSON", "{}").has_json_content_type());
        assert!(!response("text/html", "{}").has_json_content_type());
    }

    #[test]
    fn test_body_value_falls_back_to_text() {
        assert_eq!(response("application/json", r#"{"a":1}"#).body_value()["a"], 1);
        assert_eq!(
            response("application/json", "not json").body_value(),
            Value::String("not json".into())
        );
        assert_eq!(
            response("text/plain", "ok").body_value(),
            Value::String("ok".into())
        );
    }

    #[test]
    fn test_ensure_success_reports_status() {
        let mut failed = response("application/json", "{}");
        failed.status = 403;
        let err = failed.ensure_success("TweetDetail").unwrap_err();
        assert_eq!(err.to_string(), "TweetDetail request failed with status 403");
    }

    #[test]
    fn test_captured_request_sanitises_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization".into(), "Bearer t".into());
        headers.insert("Content-Length".into(), "10".into());
        headers.insert("Referer".into(), "https://x.com".into());
        let request = HttpRequest::new(Method::POST, "https://x.com/i/api/graphql/a/TweetDetail")
            .headers(headers)
            .text("{}");
        let captured = CapturedRequest::from_request(&request);
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.body.as_deref(), Some("{}"));
        assert_eq!(captured.headers.len(), 1);
        assert_eq!(captured.headers["authorization"], "Bearer t");
    }

    #[tokio::test]
    async fn test_body_stream_reports_running_count() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let file = MultipartFile {
            field: "media".into(),
            file_name: "blob".into(),
            bytes: vec![7; BODY_PIECE_BYTES * 2 + 10],
            progress: Some(ByteProgress::new(move |sent| sink.lock().push(sent))),
        };
        let pieces: Vec<usize> = file
            .into_body_stream()
            .map(|piece| piece.unwrap().len())
            .collect()
            .await;
        assert_eq!(pieces, [BODY_PIECE_BYTES, BODY_PIECE_BYTES, 10]);
        let expected = [
            BODY_PIECE_BYTES as u64,
            BODY_PIECE_BYTES as u64 * 2,
            BODY_PIECE_BYTES as u64 * 2 + 10,
        ];
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::new(Some(ReqwestClient::DEFAULT_TIMEOUT)).is_ok());
        assert!(ReqwestClient::new(None).is_ok());
    }
}
