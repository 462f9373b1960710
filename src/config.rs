use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::interceptor::upload::{DEFAULT_CHUNK_BYTES, UPLOAD_ENDPOINT};
use crate::interceptor::{PageContext, UploadConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub upload: UploadSettings,
    pub page: PageSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound on a single round-trip. Unset waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub endpoint: String,
    pub chunk_size_bytes: usize,
    pub max_status_polls: Option<u32>,
    pub processing_deadline_secs: Option<u64>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            endpoint: UPLOAD_ENDPOINT.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_BYTES,
            max_status_polls: None,
            processing_deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    pub origin: String,
    pub language: Option<String>,
    pub cookie: String,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            origin: "https://x.com".to_string(),
            language: None,
            cookie: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/threadlens/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("threadlens").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when there
    /// is no config directory or no file in it.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.bridge.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn to_upload_config(&self) -> UploadConfig {
        UploadConfig {
            endpoint: self.upload.endpoint.clone(),
            chunk_size_bytes: self.upload.chunk_size_bytes,
            max_status_polls: self.upload.max_status_polls,
            processing_deadline: self.upload.processing_deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn to_page_context(&self) -> PageContext {
        let mut page = PageContext::new(self.page.origin.clone());
        page.document_language = self.page.language.clone();
        page.cookie = self.page.cookie.clone();
        page
    }
}
