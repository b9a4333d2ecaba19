//! Error type shared by the remote client and the sync pipeline

use crate::config::ConfigError;
use crate::db::DbError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure, timeout or non-success status
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The remote service asked us to slow down. Only surfaces inside the
    /// client's retry loop; callers see `Transport` once retries run out.
    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    /// Body did not parse or lacked an expected field
    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        SyncError::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(url: &str, message: impl Into<String>) -> Self {
        SyncError::MalformedResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
