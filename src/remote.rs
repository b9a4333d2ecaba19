//! Remote template service client
//!
//! Rate-limited HTTP client for the template listing and detail endpoints.
//! Every request carries the configured API key, is spaced at least
//! `request_delay` after the previous one (across all worker threads), and is
//! retried with backoff when the service answers 429.

use crate::config::{ConfigError, RemoteSettings};
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// Wire types
// ============================================================================

/// One entry of the listing endpoint. Only the id is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /templates?count=N&page=P`
#[derive(Debug, Deserialize)]
struct TemplateListPage {
    results: Vec<TemplateSummary>,
}

/// A named placeholder inside a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// `GET /templates/<id>/details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetail {
    pub id: String,
    pub name: String,
    pub date_modified: DateTime<Utc>,
    /// A template without placeholders may omit the array
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl TemplateDetail {
    /// Token names in remote order, first occurrence wins
    pub fn token_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokens
            .iter()
            .filter(|t| seen.insert(t.name.as_str()))
            .map(|t| t.name.clone())
            .collect()
    }
}

/// Read side of the remote service, as the pipeline sees it
pub trait TemplateSource {
    /// One page of the template listing (1-based). An empty page ends the listing.
    fn list_templates(&self, page: u32, count: u32) -> Result<Vec<TemplateSummary>>;

    /// Full detail for one template
    fn template_details(&self, id: &str) -> Result<TemplateDetail>;
}

// ============================================================================
// Throttle
// ============================================================================

/// Minimum spacing between requests, shared by every thread using the client.
///
/// Holds the earliest instant the next request may go out. Callers sleep
/// without the lock and re-check on waking, so a `defer` issued while they
/// sleep still holds them back.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Mutex::new(None),
        }
    }

    /// Block until this caller may send, then claim the slot
    pub fn wait(&self) {
        loop {
            let pause = {
                let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                match *next {
                    Some(at) if at > now => at - now,
                    _ => {
                        *next = Some(now + self.interval);
                        return;
                    }
                }
            };
            std::thread::sleep(pause);
        }
    }

    /// Hold every caller back until at least `until`
    pub fn defer(&self, until: Instant) {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*next, Some(at) if at >= until) {
            *next = Some(until);
        }
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct RemoteClient {
    http: Client,
    base: Url,
    settings: RemoteSettings,
    throttle: Throttle,
}

impl RemoteClient {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let base = Url::parse(&settings.base_url).map_err(|e| ConfigError::Invalid {
            field: "remote.base_url",
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "remote.base_url",
                reason: format!("{} is not an http(s) base URL", settings.base_url),
            }
            .into());
        }

        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SyncError::transport(&settings.base_url, e.to_string()))?;

        Ok(Self {
            http,
            base,
            throttle: Throttle::new(settings.request_delay),
            settings,
        })
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Base URL joined with path segments (each segment is percent-encoded)
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET with rate-limit retries. Other failures return immediately.
    ///
    /// A rate-limit wait pauses every worker sharing this client, is never
    /// longer than `max_backoff`, and a Retry-After beyond that cap fails the
    /// request at once.
    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let cap = self.settings.max_backoff;
        let mut backoff = self.settings.retry_backoff.min(cap);
        let mut attempt = 0;

        loop {
            match self.get_once(url) {
                Err(SyncError::RateLimited { url, retry_after }) => {
                    if attempt >= self.settings.max_retries {
                        return Err(SyncError::transport(
                            &url,
                            format!("still rate limited after {} retries", attempt),
                        ));
                    }
                    if let Some(after) = retry_after.filter(|after| *after > cap) {
                        return Err(SyncError::transport(
                            &url,
                            format!(
                                "rate limited, Retry-After {}s exceeds the {}ms backoff cap",
                                after.as_secs(),
                                cap.as_millis()
                            ),
                        ));
                    }
                    attempt += 1;
                    let wait = retry_after.unwrap_or(backoff);
                    warn!(%url, attempt, wait_ms = wait.as_millis() as u64, "rate limited, backing off");
                    self.throttle.defer(Instant::now() + wait);
                    backoff = backoff.saturating_mul(2).min(cap);
                }
                other => return other,
            }
        }
    }

    fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.throttle.wait();
        debug!(%url, "GET");

        let response = self
            .http
            .get(url.clone())
            .header(AUTHORIZATION, format!("API-Key {}", self.settings.api_key))
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| SyncError::transport(url.as_str(), e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SyncError::RateLimited {
                url: url.to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SyncError::transport(
                url.as_str(),
                format!("{}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let body = response
            .text()
            .map_err(|e| SyncError::transport(url.as_str(), e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| SyncError::malformed(url.as_str(), e.to_string()))
    }
}

impl TemplateSource for RemoteClient {
    fn list_templates(&self, page: u32, count: u32) -> Result<Vec<TemplateSummary>> {
        let mut url = self.endpoint(&["templates"]);
        url.query_pairs_mut()
            .append_pair("count", &count.to_string())
            .append_pair("page", &page.to_string());

        let page: TemplateListPage = self.get_json(&url)?;
        Ok(page.results)
    }

    fn template_details(&self, id: &str) -> Result<TemplateDetail> {
        let url = self.endpoint(&["templates", id, "details"]);
        self.get_json(&url)
    }
}
