//! Fake template service for integration tests
//!
//! A tiny_http server on an ephemeral port. Every request is recorded; the
//! reply comes from a handler closure, or from a fixed catalog that answers
//! the listing and detail endpoints the way the real service does.

#![allow(dead_code)]

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tiny_http::{Header, Response, Server};

pub const API_KEY: &str = "test-key";

/// A request as the fake server saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub at: Instant,
}

impl Recorded {
    pub fn page(&self) -> Option<u32> {
        self.query.get("page").and_then(|p| p.parse().ok())
    }
}

pub struct Reply {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<String>,
}

impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
            retry_after: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<&str>) -> Self {
        Self {
            status: 429,
            body: r#"{"detail":"Too many requests"}"#.to_string(),
            retry_after: retry_after.map(String::from),
        }
    }
}

pub struct FakeRemote {
    pub base_url: String,
    server: Arc<Server>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl FakeRemote {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind fake server"));
        let addr = server
            .server_addr()
            .to_ip()
            .expect("fake server has an ip address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let recorded = record(&request);
                    requests.lock().unwrap().push(recorded.clone());

                    let reply = handler(&recorded);
                    let mut response = Response::from_string(reply.body)
                        .with_status_code(reply.status)
                        .with_header(
                            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                                .unwrap(),
                        );
                    if let Some(after) = reply.retry_after {
                        response = response.with_header(
                            Header::from_bytes(&b"Retry-After"[..], after.as_bytes()).unwrap(),
                        );
                    }
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            base_url: format!("http://{}/public/v1", addr),
            server,
            requests,
            handle: Some(handle),
        }
    }

    /// Serve a fixed set of templates: `(id, tokens)`
    pub fn catalog(templates: &[(&str, &[&str])]) -> Self {
        let templates: Vec<(String, Vec<String>)> = templates
            .iter()
            .map(|(id, tokens)| (id.to_string(), tokens.iter().map(|t| t.to_string()).collect()))
            .collect();
        Self::start(move |req| catalog_reply(&templates, req))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn detail_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.ends_with("/details"))
            .count()
    }

    pub fn listing_pages(&self) -> Vec<u32> {
        self.requests()
            .iter()
            .filter(|r| r.path.ends_with("/templates"))
            .filter_map(Recorded::page)
            .collect()
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn record(request: &tiny_http::Request) -> Recorded {
    let (path, query) = match request.url().split_once('?') {
        Some((path, query)) => (path.to_string(), query),
        None => (request.url().to_string(), ""),
    };
    let query = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let authorization = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_string());

    Recorded {
        path,
        query,
        authorization,
        at: Instant::now(),
    }
}

pub fn detail_json(id: &str, tokens: &[String]) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Template {}", id),
        "date_created": "2024-01-10T08:00:00.000000Z",
        "date_modified": "2024-03-01T12:00:00.000000Z",
        "tokens": tokens
            .iter()
            .map(|t| json!({ "name": t, "value": "" }))
            .collect::<Vec<_>>(),
    })
}

fn catalog_reply(templates: &[(String, Vec<String>)], req: &Recorded) -> Reply {
    let expected = format!("API-Key {}", API_KEY);
    if req.authorization.as_deref() != Some(expected.as_str()) {
        return Reply::status(401, r#"{"detail":"Authentication credentials were not provided."}"#);
    }

    if req.path.ends_with("/templates") {
        let count: usize = req.query.get("count").and_then(|c| c.parse().ok()).unwrap_or(50);
        let page = req.page().unwrap_or(1).max(1) as usize;
        let results: Vec<_> = templates
            .iter()
            .skip((page - 1) * count)
            .take(count)
            .map(|(id, _)| json!({ "id": id, "name": format!("Template {}", id) }))
            .collect();
        return Reply::json(json!({ "results": results }));
    }

    if let Some(rest) = req.path.strip_suffix("/details") {
        let id = rest.rsplit('/').next().unwrap_or_default();
        return match templates.iter().find(|(tid, _)| tid == id) {
            Some((tid, tokens)) => Reply::json(detail_json(tid, tokens)),
            None => Reply::status(404, r#"{"detail":"Not found."}"#),
        };
    }

    Reply::status(404, r#"{"detail":"Not found."}"#)
}
