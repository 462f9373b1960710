use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::ContentClient;
use crate::bridge::create_request_id;
use crate::bridge::message::{UploadRequest, UPLOAD_REQUEST};
use crate::error::BridgeError;
use crate::interceptor::{MediaUploadResult, UploadProgress};

/// Upload category the media endpoint expects for a MIME type.
pub fn infer_media_category(mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some(mime) if mime.starts_with("video/") => "tweet_video",
        Some("image/gif") => "tweet_gif",
        _ => "tweet_image",
    }
}

#[derive(Default)]
pub struct UploadOptions {
    pub media_type: Option<String>,
    pub media_category: Option<String>,
    pub file_name: Option<String>,
    pub chunk_size_bytes: Option<usize>,
    pub additional_owners: Vec<String>,
    pub on_progress: Option<Arc<dyn Fn(UploadProgress) + Send + Sync>>,
}

impl ContentClient {
    /// Upload `bytes` through the page realm and return the new media id.
    pub async fn upload_media(
        &self,
        bytes: &[u8],
        options: UploadOptions,
    ) -> Result<MediaUploadResult, BridgeError> {
        let media_type = options
            .media_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let media_category = options
            .media_category
            .unwrap_or_else(|| infer_media_category(Some(&media_type)).to_string());
        let request = UploadRequest {
            request_id: create_request_id("media-upload"),
            file: STANDARD.encode(bytes),
            media_type,
            media_category,
            file_name: options.file_name.unwrap_or_else(|| "media".to_string()),
            chunk_size_bytes: options.chunk_size_bytes,
            additional_owners: options.additional_owners,
        };
        let payload =
            serde_json::to_value(&request).map_err(|err| BridgeError::Decode(err.to_string()))?;

        let rx = match options.on_progress {
            Some(callback) => self
                .upload_pending
                .register_with_progress(&request.request_id, callback),
            None => self.upload_pending.register(&request.request_id),
        };
        self.endpoint.send(UPLOAD_REQUEST, payload);
        let data = self
            .await_reply(&self.upload_pending, &request.request_id, rx)
            .await?;
        serde_json::from_value(data).map_err(|err| BridgeError::Decode(err.to_string()))
    }
}
