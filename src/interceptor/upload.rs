//! Chunked media upload: INIT, APPEND per chunk, FINALIZE, then STATUS
//! polling until the server reports a terminal processing state.

use std::ops::Range;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use super::http::{ByteProgress, HeaderMap, HttpRequest, MultipartFile};
use super::replay::Replayer;
use crate::bridge::message::UploadRequest;
use crate::error::UploadError;

pub const UPLOAD_ENDPOINT: &str = "https://upload.x.com/i/media/upload.json";
pub const DEFAULT_CHUNK_BYTES: usize = 5 * 1024 * 1024;
pub const MIN_CHUNK_BYTES: usize = 1024 * 1024;
const MIN_STATUS_WAIT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub endpoint: String,
    pub chunk_size_bytes: usize,
    /// `None` polls until the server settles.
    pub max_status_polls: Option<u32>,
    pub processing_deadline: Option<Duration>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: UPLOAD_ENDPOINT.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_BYTES,
            max_status_polls: None,
            processing_deadline: None,
        }
    }
}

pub fn effective_chunk_size(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).max(MIN_CHUNK_BYTES)
}

/// Byte ranges of each APPEND. Always at least one, even for empty media.
pub fn chunk_plan(total_bytes: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    let count = total_bytes.div_ceil(chunk_size).max(1);
    (0..count)
        .map(|index| {
            let start = (index * chunk_size).min(total_bytes);
            start..(start + chunk_size).min(total_bytes)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    Init,
    Append,
    Finalize,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub phase: UploadPhase,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_state: Option<String>,
}

impl UploadProgress {
    fn at(phase: UploadPhase, uploaded: u64, total: u64) -> Self {
        let progress = if total == 0 {
            1.0
        } else {
            (uploaded as f64 / total as f64).min(1.0)
        };
        Self {
            phase,
            uploaded_bytes: uploaded,
            total_bytes: total,
            progress,
            chunk_index: None,
            chunk_count: None,
            check_after_secs: None,
            processing_state: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProcessingError {
    message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProcessingInfo {
    state: Option<String>,
    check_after_secs: Option<u64>,
    progress_percent: Option<f64>,
    error: Option<ProcessingError>,
}

impl ProcessingInfo {
    fn error_message(&self) -> Option<&str> {
        self.error.as_ref()?.message.as_deref()
    }

    fn is_pending(&self) -> bool {
        matches!(self.state.as_deref(), Some(state) if state != "succeeded")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServerImage {
    w: Option<u64>,
    h: Option<u64>,
    image_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServerVideo {
    video_type: Option<String>,
}

/// Shared shape of INIT, FINALIZE and STATUS responses.
#[derive(Debug, Clone, Default, Deserialize)]
struct MediaResponse {
    media_id: Option<u64>,
    media_id_string: Option<String>,
    media_key: Option<String>,
    size: Option<u64>,
    expires_after_secs: Option<u64>,
    image: Option<ServerImage>,
    video: Option<ServerVideo>,
    processing_info: Option<ProcessingInfo>,
}

impl MediaResponse {
    fn media_id(&self) -> Option<String> {
        self.media_id_string
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.media_id.map(|id| id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub w: Option<u64>,
    pub h: Option<u64>,
    pub image_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedVideo {
    pub video_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub state: Option<String>,
    pub progress_percent: Option<f64>,
}

/// Payload of a `media-upload:response` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUploadResult {
    pub media_id: String,
    pub media_id_string: String,
    pub media_key: Option<String>,
    pub size: Option<u64>,
    pub expires_after_secs: Option<u64>,
    pub image: Option<UploadedImage>,
    pub video: Option<UploadedVideo>,
    pub processing_info: Option<ProcessingSummary>,
}

impl MediaUploadResult {
    fn from_response(response: MediaResponse) -> Result<Self, UploadError> {
        let media_id = response
            .media_id()
            .ok_or(UploadError::MissingMediaId("FINALIZE"))?;
        Ok(Self {
            media_id_string: media_id.clone(),
            media_id,
            media_key: response.media_key,
            size: response.size,
            expires_after_secs: response.expires_after_secs,
            image: response.image.map(|image| UploadedImage {
                w: image.w,
                h: image.h,
                image_type: image.image_type,
            }),
            video: response.video.map(|video| UploadedVideo {
                video_type: video.video_type,
            }),
            processing_info: response.processing_info.map(|info| ProcessingSummary {
                state: info.state,
                progress_percent: info.progress_percent,
            }),
        })
    }
}

enum UploadState {
    Init,
    Append { media_id: String, index: usize },
    Finalize { media_id: String },
    Processing {
        media_id: String,
        latest: MediaResponse,
        polls: u32,
    },
    Succeeded(MediaResponse),
}

/// Everything one upload needs, decoded from the bridge request.
pub struct UploadJob {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub media_category: String,
    pub file_name: String,
    pub chunk_size_bytes: Option<usize>,
    pub additional_owners: Vec<String>,
}

impl UploadJob {
    pub fn from_request(request: &UploadRequest) -> Result<Self, UploadError> {
        let bytes = STANDARD
            .decode(request.file.as_bytes())
            .map_err(|err| UploadError::InvalidPayload(err.to_string()))?;
        Ok(Self {
            bytes,
            media_type: request.media_type.clone(),
            media_category: request.media_category.clone(),
            file_name: request.file_name.clone(),
            chunk_size_bytes: request.chunk_size_bytes,
            additional_owners: request.additional_owners.clone(),
        })
    }
}

pub struct MediaUploader {
    replayer: Replayer,
    config: UploadConfig,
}

impl MediaUploader {
    pub fn new(replayer: Replayer, config: UploadConfig) -> Self {
        Self { replayer, config }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = self.replayer.headers.build_graphql_headers(None);
        headers.remove("content-type");
        headers
    }

    fn command_url(&self, pairs: &[(&str, &str)]) -> Result<String, UploadError> {
        let mut url = Url::parse(&self.config.endpoint).map_err(crate::error::ReplayError::from)?;
        url.query_pairs_mut().extend_pairs(pairs);
        Ok(url.into())
    }

    async fn command(
        &self,
        request: HttpRequest,
        operation: &str,
    ) -> Result<MediaResponse, UploadError> {
        let response = self.replayer.send(request, operation).await?;
        let value = response.json()?;
        serde_json::from_value(value)
            .map_err(|err| UploadError::Replay(crate::error::ReplayError::Json(err)))
    }

    /// Drive one upload to a terminal state, reporting progress as it goes.
    pub async fn upload(
        &self,
        job: &UploadJob,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<MediaUploadResult, UploadError> {
        let headers = self.headers();
        let total = job.bytes.len() as u64;
        let chunk_size = effective_chunk_size(job.chunk_size_bytes, self.config.chunk_size_bytes);
        let chunks = chunk_plan(job.bytes.len(), chunk_size);
        let chunk_count = chunks.len();
        let mut uploaded: u64 = 0;
        let started = Instant::now();
        let mut state = UploadState::Init;

        loop {
            state = match state {
                UploadState::Init => {
                    on_progress(UploadProgress::at(UploadPhase::Init, 0, total));
                    let total_str = total.to_string();
                    let owners = job.additional_owners.join(",");
                    let mut pairs = vec![
                        ("command", "INIT"),
                        ("media_type", job.media_type.as_str()),
                        ("total_bytes", total_str.as_str()),
                        ("media_category", job.media_category.as_str()),
                    ];
                    if !owners.is_empty() {
                        pairs.push(("additional_owners", owners.as_str()));
                    }
                    let request = HttpRequest::new(Method::POST, self.command_url(&pairs)?)
                        .headers(headers.clone());
                    let response = self.command(request, "INIT").await?;
                    let media_id = response.media_id().ok_or(UploadError::MissingMediaId("INIT"))?;
                    debug!("upload initialised as media {}", media_id);
                    UploadState::Append { media_id, index: 0 }
                }
                UploadState::Append { media_id, index } if index < chunk_count => {
                    let range = chunks[index].clone();
                    let segment = index.to_string();
                    let url = self.command_url(&[
                        ("command", "APPEND"),
                        ("media_id", media_id.as_str()),
                        ("segment_index", segment.as_str()),
                    ])?;
                    let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
                    let request = HttpRequest::new(Method::POST, url)
                        .headers(headers.clone())
                        .multipart(MultipartFile {
                            field: "media".into(),
                            file_name: job.file_name.clone(),
                            bytes: job.bytes[range.clone()].to_vec(),
                            progress: Some(ByteProgress::new(move |sent| {
                                let _ = sent_tx.send(sent);
                            })),
                        });

                    let chunk_start = uploaded;
                    let report = |sent: u64| {
                        let mut progress =
                            UploadProgress::at(UploadPhase::Append, chunk_start + sent, total);
                        progress.chunk_index = Some(index);
                        progress.chunk_count = Some(chunk_count);
                        on_progress(progress);
                    };

                    // Relay byte counts while the chunk is in flight.
                    let send = self.replayer.send(request, "APPEND");
                    tokio::pin!(send);
                    let mut reported = None;
                    let result = loop {
                        tokio::select! {
                            biased;
                            Some(sent) = sent_rx.recv() => {
                                report(sent);
                                reported = Some(sent);
                            }
                            result = &mut send => break result,
                        }
                    };
                    while let Ok(sent) = sent_rx.try_recv() {
                        report(sent);
                        reported = Some(sent);
                    }
                    result?;

                    let chunk_len = range.len() as u64;
                    if reported != Some(chunk_len) {
                        report(chunk_len);
                    }
                    uploaded += chunk_len;
                    UploadState::Append {
                        media_id,
                        index: index + 1,
                    }
                }
                UploadState::Append { media_id, .. } => UploadState::Finalize { media_id },
                UploadState::Finalize { media_id } => {
                    let mut progress = UploadProgress::at(UploadPhase::Finalize, total, total);
                    progress.progress = 1.0;
                    on_progress(progress);
                    let url =
                        self.command_url(&[("command", "FINALIZE"), ("media_id", media_id.as_str())])?;
                    let request = HttpRequest::new(Method::POST, url).headers(headers.clone());
                    let latest = self.command(request, "FINALIZE").await?;
                    UploadState::Processing {
                        media_id,
                        latest,
                        polls: 0,
                    }
                }
                UploadState::Processing {
                    media_id,
                    latest,
                    polls,
                } => {
                    let info = latest.processing_info.clone().unwrap_or_default();
                    if info.state.as_deref() == Some("failed") {
                        let message = info.error_message().unwrap_or("media processing failed");
                        return Err(UploadError::ProcessingFailed(message.to_string()));
                    }
                    if let Some(message) = info.error_message() {
                        return Err(UploadError::ProcessingFailed(message.to_string()));
                    }
                    if !info.is_pending() {
                        UploadState::Succeeded(latest)
                    } else {
                        if self.config.max_status_polls.is_some_and(|max| polls >= max) {
                            return Err(UploadError::ProcessingTimeout { polls });
                        }
                        let wait = MIN_STATUS_WAIT
                            .max(Duration::from_secs(info.check_after_secs.unwrap_or(1)));
                        if self
                            .config
                            .processing_deadline
                            .is_some_and(|deadline| started.elapsed() + wait > deadline)
                        {
                            return Err(UploadError::ProcessingTimeout { polls });
                        }

                        let mut progress = UploadProgress::at(UploadPhase::Processing, total, total);
                        progress.progress = 1.0;
                        progress.check_after_secs = info.check_after_secs;
                        progress.processing_state = info.state.clone();
                        on_progress(progress);

                        tokio::time::sleep(wait).await;
                        let url = self
                            .command_url(&[("command", "STATUS"), ("media_id", media_id.as_str())])?;
                        let request = HttpRequest::new(Method::GET, url).headers(headers.clone());
                        let latest = self.command(request, "STATUS").await?;
                        UploadState::Processing {
                            media_id,
                            latest,
                            polls: polls + 1,
                        }
                    }
                }
                UploadState::Succeeded(latest) => {
                    let result = MediaUploadResult::from_response(latest)?;
                    info!("media {} uploaded ({} bytes)", result.media_id, total);
                    return Ok(result);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::interceptor::http::RequestBody;
    use crate::interceptor::replay::fake::{replayer, ScriptedHttp};

    fn job(size: usize, chunk: Option<usize>) -> UploadJob {
        UploadJob {
            bytes: vec![7u8; size],
            media_type: "image/png".into(),
            media_category: "tweet_image".into(),
            file_name: "a.png".into(),
            chunk_size_bytes: chunk,
            additional_owners: Vec::new(),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<UploadProgress>>>, impl Fn(UploadProgress) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p| sink.lock().push(p))
    }

    #[test]
    fn test_chunk_plan_accounting() {
        let mib = MIN_CHUNK_BYTES;
        let plan = chunk_plan(5 * mib + 1, mib);
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[5], 5 * mib..5 * mib + 1);
        assert_eq!(plan.iter().map(|r| r.len()).sum::<usize>(), 5 * mib + 1);
        assert_eq!(chunk_plan(0, mib), vec![0..0]);
        assert_eq!(chunk_plan(mib, mib).len(), 1);
    }

    #[test]
    fn test_chunk_size_floor() {
        assert_eq!(effective_chunk_size(Some(10), DEFAULT_CHUNK_BYTES), MIN_CHUNK_BYTES);
        assert_eq!(effective_chunk_size(None, DEFAULT_CHUNK_BYTES), DEFAULT_CHUNK_BYTES);
        assert_eq!(effective_chunk_size(Some(2 * MIN_CHUNK_BYTES), 0), 2 * MIN_CHUNK_BYTES);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_with_processing() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id": 77}));
        http.push_json(204, json!({}));
        http.push_json(204, json!({}));
        http.push_json(200, json!({
            "media_id_string": "77",
            "processing_info": {"state": "pending", "check_after_secs": 3}
        }));
        http.push_json(200, json!({
            "media_id_string": "77",
            "processing_info": {"state": "in_progress", "check_after_secs": 0, "progress_percent": 50}
        }));
        http.push_json(200, json!({
            "media_id_string": "77",
            "media_key": "3_77",
            "video": {"video_type": "video/mp4"},
            "processing_info": {"state": "succeeded", "progress_percent": 100}
        }));
        let uploader = MediaUploader::new(replayer(http.clone()), UploadConfig::default());
        let (seen, sink) = recorder();
        let started = Instant::now();

        let result = uploader
            .upload(&job(MIN_CHUNK_BYTES + 10, Some(1)), &sink)
            .await
            .unwrap();

        assert_eq!(result.media_id, "77");
        assert_eq!(result.media_key.as_deref(), Some("3_77"));
        assert_eq!(result.processing_info.unwrap().state.as_deref(), Some("succeeded"));
        // 3s for the first wait, then the 1s floor.
        assert!(started.elapsed() >= Duration::from_secs(4));

        let mut phases: Vec<UploadPhase> = seen.lock().iter().map(|p| p.phase).collect();
        phases.dedup();
        assert_eq!(
            phases,
            vec![
                UploadPhase::Init,
                UploadPhase::Append,
                UploadPhase::Finalize,
                UploadPhase::Processing,
                UploadPhase::Processing,
            ]
        );
        let appends: Vec<_> = seen
            .lock()
            .iter()
            .filter(|p| p.phase == UploadPhase::Append)
            .cloned()
            .collect();
        assert_eq!(appends[0].chunk_count, Some(2));
        assert_eq!(appends[0].chunk_index, Some(0));
        let last = appends.last().unwrap();
        assert_eq!(last.chunk_index, Some(1));
        assert_eq!(last.uploaded_bytes, (MIN_CHUNK_BYTES + 10) as u64);
        assert_eq!(last.progress, 1.0);

        let append = http.request(1);
        assert!(append.url.contains("command=APPEND"));
        assert!(append.url.contains("segment_index=0"));
        assert!(!append.headers.contains_key("content-type"));
        let RequestBody::Multipart(file) = append.body else {
            panic!("APPEND must send multipart");
        };
        assert_eq!(file.field, "media");
        assert_eq!(file.bytes.len(), MIN_CHUNK_BYTES);
        assert_eq!(http.request(4).method, Method::GET);
    }

    #[tokio::test]
    async fn test_append_progress_rises_within_a_chunk() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id_string": "8"}));
        http.push_json(204, json!({}));
        http.push_json(200, json!({"media_id_string": "8"}));
        let uploader = MediaUploader::new(replayer(http.clone()), UploadConfig::default());
        let (seen, sink) = recorder();
        let size = 3 * MIN_CHUNK_BYTES;

        uploader.upload(&job(size, None), &sink).await.unwrap();

        let appends: Vec<UploadProgress> = seen
            .lock()
            .iter()
            .filter(|p| p.phase == UploadPhase::Append)
            .cloned()
            .collect();
        // One chunk under the default size, reported piece by piece.
        assert!(appends.iter().all(|p| p.chunk_count == Some(1)));
        assert!(appends.len() > 1, "{:?}", appends);
        assert!(appends[0].uploaded_bytes < size as u64);
        assert!(appends[0].progress > 0.0 && appends[0].progress < 1.0);
        assert!(appends
            .windows(2)
            .all(|pair| pair[0].uploaded_bytes < pair[1].uploaded_bytes));
        let last = appends.last().unwrap();
        assert_eq!(last.uploaded_bytes, size as u64);
        assert_eq!(last.progress, 1.0);
    }

    #[tokio::test]
    async fn test_empty_media_reports_full_progress() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id_string": "5"}));
        http.push_json(200, json!({}));
        http.push_json(200, json!({"media_id_string": "5", "image": {"w": 1, "h": 2, "image_type": "image/png"}}));
        let uploader = MediaUploader::new(replayer(http.clone()), UploadConfig::default());
        let (seen, sink) = recorder();
        let result = uploader.upload(&job(0, None), &sink).await.unwrap();
        assert_eq!(result.image.unwrap().image_type.as_deref(), Some("image/png"));
        assert!(seen.lock().iter().all(|p| p.progress == 1.0));
    }

    #[tokio::test]
    async fn test_failed_processing_aborts() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id_string": "5"}));
        http.push_json(200, json!({}));
        http.push_json(200, json!({
            "media_id_string": "5",
            "processing_info": {"state": "failed", "error": {"message": "InvalidMedia"}}
        }));
        let uploader = MediaUploader::new(replayer(http), UploadConfig::default());
        let err = uploader.upload(&job(3, None), &|_| {}).await.unwrap_err();
        assert!(matches!(err, UploadError::ProcessingFailed(ref m) if m == "InvalidMedia"));
    }

    #[tokio::test]
    async fn test_init_without_media_id() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({}));
        let uploader = MediaUploader::new(replayer(http), UploadConfig::default());
        let err = uploader.upload(&job(3, None), &|_| {}).await.unwrap_err();
        assert_eq!(err.to_string(), "INIT response is missing media_id");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_polls_are_bounded() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id_string": "5"}));
        http.push_json(200, json!({}));
        for _ in 0..3 {
            http.push_json(200, json!({
                "media_id_string": "5",
                "processing_info": {"state": "in_progress", "check_after_secs": 1}
            }));
        }
        let config = UploadConfig {
            max_status_polls: Some(2),
            ..UploadConfig::default()
        };
        let uploader = MediaUploader::new(replayer(http), config);
        let err = uploader.upload(&job(3, None), &|_| {}).await.unwrap_err();
        assert!(matches!(err, UploadError::ProcessingTimeout { polls: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_deadline() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_json(200, json!({"media_id_string": "5"}));
        http.push_json(200, json!({}));
        http.push_json(200, json!({
            "media_id_string": "5",
            "processing_info": {"state": "pending", "check_after_secs": 30}
        }));
        let config = UploadConfig {
            processing_deadline: Some(Duration::from_secs(10)),
            ..UploadConfig::default()
        };
        let uploader = MediaUploader::new(replayer(http), config);
        let err = uploader.upload(&job(3, None), &|_| {}).await.unwrap_err();
        assert!(matches!(err, UploadError::ProcessingTimeout { polls: 0 }));
    }

    #[test]
    fn test_job_rejects_bad_base64() {
        let request = UploadRequest {
            request_id: "r".into(),
            file: "!!!".into(),
            media_type: "image/png".into(),
            media_category: "tweet_image".into(),
            file_name: "a.png".into(),
            chunk_size_bytes: None,
            additional_owners: Vec::new(),
        };
        assert!(matches!(
            UploadJob::from_request(&request),
            Err(UploadError::InvalidPayload(_))
        ));
    }
}
