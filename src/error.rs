use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced to callers waiting on a bridge round-trip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The counterpart realm answered with an `*-error` envelope.
    #[error("{0}")]
    Remote(String),

    #[error("request {0} was abandoned before a response arrived")]
    Dropped(String),

    #[error("request {request_id} timed out after {secs}s")]
    Timeout { request_id: String, secs: u64 },

    #[error("unexpected response payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Input checks performed before any message leaves the content realm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("reply text must not be empty")]
    EmptyReplyText,

    #[error("missing poll endpoint")]
    MissingPollEndpoint,

    #[error("missing poll card uri")]
    MissingPollCardUri,

    #[error("missing poll card name")]
    MissingPollCardName,

    #[error("missing user id")]
    MissingUserId,

    #[error("unknown friendship action: {0}")]
    UnknownFriendshipAction(String),
}

/// Errors raised while replaying an authenticated call from the page realm.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("{operation} request failed with status {status}")]
    Status { operation: String, status: u16 },

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<reqwest::Error> for ReplayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("{0} response is missing media_id")]
    MissingMediaId(&'static str),

    #[error("media processing failed: {0}")]
    ProcessingFailed(String),

    #[error("media processing did not finish after {polls} status checks")]
    ProcessingTimeout { polls: u32 },

    #[error("invalid upload payload: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
