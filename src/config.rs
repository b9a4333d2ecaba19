//! Configuration file support for template-sync
//!
//! Reads from .template-sync/config.toml, with the credential and base URL
//! overridable from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory holding the config file and the default database
pub const CONFIG_DIR: &str = ".template-sync";

/// Credential override; takes priority over `remote.api_key`
pub const API_KEY_ENV: &str = "TEMPLATE_SYNC_API_KEY";

/// Base URL override
pub const BASE_URL_ENV: &str = "TEMPLATE_SYNC_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no API key configured (set TEMPLATE_SYNC_API_KEY or remote.api_key)")]
    MissingApiKey,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Remote template service settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Pipeline settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote service connection and pacing
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Static API key. Prefer the environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Listing page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Minimum spacing between any two remote requests
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on a rate-limit response before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff after a rate-limit response; doubles on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Longest single rate-limit wait. A larger Retry-After fails the request.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Stop discovery with an error after this many pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Worker threads for the upsert and reconcile stages
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_base_url() -> String {
    "https://api.pandadoc.com/public/v1".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_workers() -> usize {
    4
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_size: default_page_size(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_pages: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Everything the remote client needs, resolved and validated
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub base_url: String,
    pub api_key: String,
    pub request_delay: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Config {
    /// Load config from .template-sync/config.toml
    /// Returns default config if no file exists; a broken file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find config.toml by walking up directory tree
    pub fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(CONFIG_DIR).join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Resolve remote settings, applying environment overrides
    pub fn remote_settings(&self) -> Result<RemoteSettings, ConfigError> {
        self.remote_settings_with(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(BASE_URL_ENV).ok(),
        )
    }

    /// Resolve remote settings with explicit overrides (env values in practice)
    pub fn remote_settings_with(
        &self,
        api_key_override: Option<String>,
        base_url_override: Option<String>,
    ) -> Result<RemoteSettings, ConfigError> {
        let api_key = api_key_override
            .or_else(|| self.remote.api_key.clone())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let base_url = base_url_override
            .unwrap_or_else(|| self.remote.base_url.clone())
            .trim_end_matches('/')
            .to_string();

        Ok(RemoteSettings {
            base_url,
            api_key,
            request_delay: Duration::from_millis(self.remote.request_delay_ms),
            timeout: Duration::from_secs(self.remote.timeout_secs),
            max_retries: self.remote.max_retries,
            retry_backoff: Duration::from_millis(self.remote.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.remote.max_backoff_ms),
        })
    }

    /// Serialized defaults, written by `template-sync init`
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
