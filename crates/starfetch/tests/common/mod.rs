//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use starfetch::FetchConfig;
use starfetch::http::{
    BlockingHttpTransport, HttpError, HttpRequest, HttpResponse, HttpTransport,
};

pub const BASE: &str = "https://api.test";

/// A scripted failure for one attempt at a page.
#[derive(Debug, Clone)]
pub enum Fault {
    Status(u16),
    StatusWithHeaders(u16, Vec<(String, String)>, String),
    Connect,
    Garbage,
}

/// Serves `total` starred repositories (ids 1..=total) page by page.
///
/// Page and page size are read from the request query, so the same transport
/// works for any configured page size. Faults are consumed one per attempt.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    total: u64,
    faults: HashMap<u32, VecDeque<Fault>>,
    rate_headers: Vec<(String, String)>,
    requests: Vec<HttpRequest>,
}

impl ScriptedTransport {
    pub fn with_records(total: u64) -> Self {
        let transport = Self::default();
        transport.lock().total = total;
        transport
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a failure for the next attempt at `page`.
    pub fn fail_page(&self, page: u32, fault: Fault) -> &Self {
        self.lock().faults.entry(page).or_default().push_back(fault);
        self
    }

    /// Headers attached to every successful page.
    pub fn with_rate_headers(&self, headers: &[(&str, &str)]) -> &Self {
        self.lock().rate_headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Page numbers in request order, retries included.
    pub fn pages_requested(&self) -> Vec<u32> {
        self.requests()
            .iter()
            .map(|r| query_u32(&r.url, "page").unwrap_or(0))
            .collect()
    }

    fn respond(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self.lock();
        let page = query_u32(&request.url, "page").unwrap_or(1);
        let per_page = query_u32(&request.url, "per_page").unwrap_or(30);
        inner.requests.push(request);

        if let Some(fault) = inner.faults.get_mut(&page).and_then(|q| q.pop_front()) {
            return match fault {
                Fault::Status(status) => Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: Vec::new(),
                }),
                Fault::StatusWithHeaders(status, headers, body) => Ok(HttpResponse {
                    status,
                    headers,
                    body: body.into_bytes(),
                }),
                Fault::Connect => Err(HttpError::Connect("connection refused".to_string())),
                Fault::Garbage => Ok(HttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: b"<html>oops</html>".to_vec(),
                }),
            };
        }

        let start = u64::from(page.saturating_sub(1)) * u64::from(per_page);
        let end = (start + u64::from(per_page)).min(inner.total);
        let items: Vec<Value> = (start..end).map(|i| repo_payload(i + 1)).collect();

        Ok(HttpResponse {
            status: 200,
            headers: inner.rate_headers.clone(),
            body: serde_json::to_vec(&items).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.respond(request)
    }
}

impl BlockingHttpTransport for ScriptedTransport {
    fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.respond(request)
    }
}

fn query_u32(url: &str, key: &str) -> Option<u32> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

pub fn repo_payload(id: u64) -> Value {
    json!({
        "id": id,
        "name": format!("repo-{id}"),
        "full_name": format!("owner-{}/repo-{id}", id % 7),
        "description": if id % 2 == 0 { Value::Null } else { json!(format!("Repository {id}")) },
        "html_url": format!("https://github.com/owner-{}/repo-{id}", id % 7),
        "stargazers_count": id * 3,
        "forks_count": id,
        "language": "Rust",
        "topics": ["cli", "rust"],
        "created_at": "2020-01-01T00:00:00Z",
        "updated_at": if id % 5 == 0 { json!("yesterday") } else { json!("2024-06-01T12:00:00Z") },
        "archived": id % 11 == 0,
        "size": id * 100,
        "default_branch": "main",
        "license": {"key": "mit", "spdx_id": "MIT"}
    })
}

pub fn config(page_size: u32) -> FetchConfig {
    FetchConfig::new("octocat")
        .with_base_url(BASE)
        .with_page_size(page_size)
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(1))
        .with_request_delay(Duration::ZERO)
}
