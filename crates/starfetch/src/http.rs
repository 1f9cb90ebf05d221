//! Transport boundary for all HTTP I/O.
//!
//! The fetch engine never talks to a socket directly. It builds an
//! [`HttpRequest`], hands it to an injected transport, and interprets the
//! [`HttpResponse`] that comes back. Two transport traits exist because the
//! engine has two delivery forms: [`HttpTransport`] for the suspending form
//! and [`BlockingHttpTransport`] for the blocking one.

use async_trait::async_trait;
use thiserror::Error;

/// Minimal HTTP method enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
        }
    }
}

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    /// Create a GET request with no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded lossily as UTF-8, for error messages.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failures. No status code was received.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

/// Suspending transport used by the streaming fetch path.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Blocking transport used by the materializing fetch path.
pub trait BlockingHttpTransport: Send + Sync {
    fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(feature = "reqwest")]
pub mod reqwest_transport {
    use super::*;

    use std::time::Duration as StdDuration;

    fn user_agent() -> String {
        format!("starfetch/{}", env!("CARGO_PKG_VERSION"))
    }

    fn classify_reqwest_error(e: &reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout(e.to_string())
        } else if e.is_connect() {
            HttpError::Connect(e.to_string())
        } else {
            HttpError::Transport(e.to_string())
        }
    }

    fn collect_headers(map: &reqwest::header::HeaderMap) -> HttpHeaders {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// A real async HTTP transport backed by reqwest.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent())
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
            };
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;

            let status = resp.status().as_u16();
            let headers = collect_headers(resp.headers());
            let body = resp
                .bytes()
                .await
                .map_err(|e| classify_reqwest_error(&e))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    /// A real blocking HTTP transport backed by `reqwest::blocking`.
    ///
    /// Must not be created or dropped from within an async runtime; construct
    /// it on the thread that performs the blocking fetch.
    #[derive(Clone)]
    pub struct ReqwestBlockingTransport {
        client: reqwest::blocking::Client,
    }

    impl ReqwestBlockingTransport {
        pub fn new(client: reqwest::blocking::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent())
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl BlockingHttpTransport for ReqwestBlockingTransport {
        fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
            };
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }

            let resp = builder.send().map_err(|e| classify_reqwest_error(&e))?;

            let status = resp.status().as_u16();
            let headers = collect_headers(resp.headers());
            let body = resp
                .bytes()
                .map_err(|e| classify_reqwest_error(&e))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// In-memory mock transport.
///
/// Responses are registered per URL and served in FIFO order. Both transport
/// traits share the same queues, so a single mock can back either fetch form.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<String, VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a URL.
    pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.push_result(url, Ok(response));
    }

    /// Register a transport failure for a URL.
    pub fn push_error(&self, url: impl Into<String>, error: HttpError) {
        self.push_result(url, Err(error));
    }

    fn push_result(&self, url: impl Into<String>, result: Result<HttpResponse, HttpError>) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.routes.entry(url.into()).or_default().push_back(result);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }

    fn respond(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let url = request.url.clone();
        inner.requests.push(request);

        match inner.routes.get_mut(&url).and_then(|q| q.pop_front()) {
            Some(result) => result,
            None => Err(HttpError::NoMockResponse {
                method: HttpMethod::Get.as_str().to_string(),
                url,
            }),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.respond(request)
    }
}

#[cfg(test)]
impl BlockingHttpTransport for MockTransport {
    fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.respond(request)
    }
}
