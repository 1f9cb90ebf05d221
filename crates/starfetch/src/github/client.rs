//! GitHub API client creation and request plumbing.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use super::types::{ContentResponse, GitHubRateLimitResponse};
use crate::config::{ConfigError, FetchConfig};
use crate::error::FetchError;
use crate::http::{
    BlockingHttpTransport, HttpError, HttpRequest, HttpResponse, HttpTransport, header_get,
};
use crate::progress::{FetchProgress, ProgressCallback, emit};
use crate::rate_limit::{
    HEADER_RESET, HEADER_RETRY_AFTER, RateLimitState, RateLimitTracker, is_quota_exhausted,
};
use crate::repository::Repository;
use crate::retry::{Classification, Outcome, classify, with_retry, with_retry_blocking};

#[cfg(feature = "reqwest")]
use crate::http::reqwest_transport::{ReqwestBlockingTransport, ReqwestTransport};

/// Media type for the REST API.
pub const ACCEPT: &str = "application/vnd.github+json";

/// Errors raised while constructing a [`GitHubClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP transport: {0}")]
    Http(#[from] HttpError),
}

fn user_agent() -> String {
    format!("starfetch/{}", env!("CARGO_PKG_VERSION"))
}

/// Client for a user's starred repositories.
///
/// Holds the configuration, the optional token, the shared rate-limit tracker
/// and one or both transports. Cloning is cheap; clones share the tracker and
/// the transports.
#[derive(Clone)]
pub struct GitHubClient {
    config: Arc<FetchConfig>,
    token: Option<String>,
    tracker: RateLimitTracker,
    transport: Option<Arc<dyn HttpTransport>>,
    blocking_transport: Option<Arc<dyn BlockingHttpTransport>>,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("config", &self.config)
            .field("authenticated", &self.token.is_some())
            .field("tracker", &self.tracker.snapshot())
            .field("async_transport", &self.transport.is_some())
            .field("blocking_transport", &self.blocking_transport.is_some())
            .finish()
    }
}

impl GitHubClient {
    /// Create a client with a real async transport.
    ///
    /// Use [`GitHubClient::new_blocking`] for the blocking fetch form; a
    /// blocking reqwest client must not be created inside an async runtime.
    #[cfg(feature = "reqwest")]
    pub fn new(config: FetchConfig, token: Option<String>) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::with_timeout(config.timeout())?;
        Self::build(config, token, Some(Arc::new(transport)), None)
    }

    /// Create a client with a real blocking transport.
    #[cfg(feature = "reqwest")]
    pub fn new_blocking(config: FetchConfig, token: Option<String>) -> Result<Self, ClientError> {
        let transport = ReqwestBlockingTransport::with_timeout(config.timeout())?;
        Self::build(config, token, None, Some(Arc::new(transport)))
    }

    pub fn with_transport(
        config: FetchConfig,
        token: Option<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        Self::build(config, token, Some(transport), None)
    }

    pub fn with_blocking_transport(
        config: FetchConfig,
        token: Option<String>,
        transport: Arc<dyn BlockingHttpTransport>,
    ) -> Result<Self, ClientError> {
        Self::build(config, token, None, Some(transport))
    }

    pub fn with_transports(
        config: FetchConfig,
        token: Option<String>,
        transport: Arc<dyn HttpTransport>,
        blocking_transport: Arc<dyn BlockingHttpTransport>,
    ) -> Result<Self, ClientError> {
        Self::build(config, token, Some(transport), Some(blocking_transport))
    }

    fn build(
        config: FetchConfig,
        token: Option<String>,
        transport: Option<Arc<dyn HttpTransport>>,
        blocking_transport: Option<Arc<dyn BlockingHttpTransport>>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let tracker = RateLimitTracker::new(config.rate_limit);
        Ok(Self {
            config: Arc::new(config),
            token: token.filter(|t| !t.trim().is_empty()),
            tracker,
            transport,
            blocking_transport,
            on_progress: None,
        })
    }

    /// Share a tracker with other clients.
    #[must_use]
    pub fn with_tracker(mut self, tracker: RateLimitTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Install a progress callback used by every fetch on this client.
    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn tracker(&self) -> &RateLimitTracker {
        &self.tracker
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| FetchError::transport(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::transport("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of one page of a user's starred repositories.
    pub fn starred_url(&self, username: &str, page: u32) -> Result<Url, FetchError> {
        let mut url = self.api_url(&["users", username, "starred"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &self.config.page_size.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("sort", &self.config.sort)
            .append_pair("direction", &self.config.direction);
        Ok(url)
    }

    fn build_request(&self, url: &Url) -> HttpRequest {
        let request = HttpRequest::get(url.as_str())
            .header("Accept", ACCEPT)
            .header("User-Agent", user_agent());
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// How long to sleep before the next request, if the quota is spent.
    fn preemptive_wait(
        &self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Option<Duration>, FetchError> {
        let Some(wait) = self.tracker.wait_duration(Utc::now()) else {
            return Ok(None);
        };
        let reset = self.tracker.snapshot().reset_at;

        if wait > self.config.max_rate_limit_wait() {
            let reset_at = DateTime::from_timestamp(reset, 0).unwrap_or_else(Utc::now);
            tracing::warn!(
                wait_secs = wait.as_secs(),
                %reset_at,
                "Rate limit reset is too far away, giving up"
            );
            return Err(FetchError::RateLimited { reset_at });
        }

        tracing::warn!(
            wait_secs = wait.as_secs(),
            reset_at = reset,
            "Rate limit exhausted, waiting for reset"
        );
        emit(
            on_progress,
            FetchProgress::RateLimitWait {
                wait,
                reset_at: reset,
            },
        );
        Ok(Some(wait))
    }

    /// One attempt: wait out an exhausted quota, send, record rate-limit headers.
    async fn send_async(
        &self,
        request: HttpRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<HttpResponse, FetchError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| FetchError::transport("no async transport configured"))?;

        if let Some(wait) = self.preemptive_wait(on_progress)? {
            tokio::time::sleep(wait).await;
            self.tracker.mark_window_reset();
        }

        tracing::debug!(url = %request.url, "GET");
        let response = transport.send(request).await?;
        self.tracker.observe(&response.headers);
        Ok(response)
    }

    fn send_blocking(
        &self,
        request: HttpRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<HttpResponse, FetchError> {
        let transport = self
            .blocking_transport
            .as_ref()
            .ok_or_else(|| FetchError::transport("no blocking transport configured"))?;

        if let Some(wait) = self.preemptive_wait(on_progress)? {
            std::thread::sleep(wait);
            self.tracker.mark_window_reset();
        }

        tracing::debug!(url = %request.url, "GET");
        let response = transport.send_blocking(request)?;
        self.tracker.observe(&response.headers);
        Ok(response)
    }

    /// GET `url` under the retry policy, interpreting each response with `interpret`.
    pub(crate) async fn get_with_retry<T, F>(
        &self,
        url: Url,
        label: &str,
        on_progress: Option<&ProgressCallback>,
        interpret: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&HttpResponse) -> Result<T, FetchError> + Sync,
    {
        let request = self.build_request(&url);
        let interpret = &interpret;
        with_retry(self.config.retry(), label, on_progress, || {
            let request = request.clone();
            async move {
                let response = self.send_async(request, on_progress).await?;
                interpret(&response)
            }
        })
        .await
    }

    pub(crate) fn get_with_retry_blocking<T, F>(
        &self,
        url: Url,
        label: &str,
        on_progress: Option<&ProgressCallback>,
        interpret: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&HttpResponse) -> Result<T, FetchError>,
    {
        let request = self.build_request(&url);
        with_retry_blocking(self.config.retry(), label, on_progress, || {
            let response = self.send_blocking(request.clone(), on_progress)?;
            interpret(&response)
        })
    }

    pub(crate) async fn fetch_page(
        &self,
        username: &str,
        page: u32,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<Repository>, FetchError> {
        let url = self.starred_url(username, page)?;
        let resource = user_resource(username);
        let tracker = &self.tracker;
        self.get_with_retry(url, &format!("page {page}"), on_progress, |response| {
            interpret_response(response, tracker, &resource)
        })
        .await
    }

    pub(crate) fn fetch_page_blocking(
        &self,
        username: &str,
        page: u32,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<Repository>, FetchError> {
        let url = self.starred_url(username, page)?;
        let resource = user_resource(username);
        let tracker = &self.tracker;
        self.get_with_retry_blocking(url, &format!("page {page}"), on_progress, |response| {
            interpret_response(response, tracker, &resource)
        })
    }

    /// Query `/rate_limit` and refresh the tracker from the `core` resource.
    pub async fn get_rate_limits(&self) -> Result<GitHubRateLimitResponse, FetchError> {
        let url = self.api_url(&["rate_limit"])?;
        let tracker = &self.tracker;
        let limits: GitHubRateLimitResponse = self
            .get_with_retry(url, "rate_limit", self.progress(), |response| {
                check_status(response, tracker, "rate limit")?;
                parse_json(response)
            })
            .await?;
        self.tracker
            .replace(RateLimitState::from(&limits.resources.core));
        Ok(limits)
    }

    pub fn get_rate_limits_blocking(&self) -> Result<GitHubRateLimitResponse, FetchError> {
        let url = self.api_url(&["rate_limit"])?;
        let tracker = &self.tracker;
        let limits: GitHubRateLimitResponse =
            self.get_with_retry_blocking(url, "rate_limit", self.progress(), |response| {
                check_status(response, tracker, "rate limit")?;
                parse_json(response)
            })?;
        self.tracker
            .replace(RateLimitState::from(&limits.resources.core));
        Ok(limits)
    }

    /// Fetch a single repository record.
    pub async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, FetchError> {
        let url = self.api_url(&["repos", owner, name])?;
        let resource = format!("repository {owner}/{name}");
        let tracker = &self.tracker;
        self.get_with_retry(url, &resource, self.progress(), |response| {
            check_status(response, tracker, &resource)?;
            let raw: serde_json::Value = parse_json(response)?;
            Repository::parse(&raw).map_err(|e| FetchError::malformed(e.to_string()))
        })
        .await
    }

    /// Fetch a file (or the README when `path` is `None`) as text.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub async fn get_readme(
        &self,
        owner: &str,
        name: &str,
        path: Option<&str>,
    ) -> Result<Option<String>, FetchError> {
        let mut segments = vec!["repos", owner, name];
        match path {
            Some(path) => {
                segments.push("contents");
                segments.extend(path.split('/').filter(|s| !s.is_empty()));
            }
            None => segments.push("readme"),
        }
        let url = self.api_url(&segments)?;
        let resource = format!("content of {owner}/{name}");
        let tracker = &self.tracker;
        self.get_with_retry(url, &resource, self.progress(), |response| {
            if response.status == 404 {
                return Ok(None);
            }
            check_status(response, tracker, &resource)?;
            let content: ContentResponse = parse_json(response)?;
            decode_content(&content).map(Some)
        })
        .await
    }
}

fn user_resource(username: &str) -> String {
    format!("user {username}")
}

fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, FetchError> {
    serde_json::from_slice(&response.body).map_err(|e| FetchError::malformed(e.to_string()))
}

fn decode_content(content: &ContentResponse) -> Result<String, FetchError> {
    if content.encoding != "base64" {
        return Ok(content.content.clone());
    }
    let cleaned: String = content
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(cleaned)
        .map_err(|e| FetchError::malformed(format!("invalid base64 content: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Best-effort message from an error body.
fn api_message(response: &HttpResponse) -> String {
    let from_json = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    if let Some(message) = from_json {
        return message;
    }
    let text = response.body_text();
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        text.chars().take(200).collect()
    }
}

/// Reset hint for a rate-limited response.
fn rate_limit_reset(response: &HttpResponse, tracker: &RateLimitTracker) -> DateTime<Utc> {
    if let Some(reset) = header_get(&response.headers, HEADER_RESET)
        .and_then(|v| v.trim().parse::<i64>().ok())
        && let Some(reset_at) = DateTime::from_timestamp(reset, 0)
    {
        return reset_at;
    }
    if let Some(secs) =
        header_get(&response.headers, HEADER_RETRY_AFTER).and_then(|v| v.trim().parse::<i64>().ok())
    {
        return Utc::now() + chrono::Duration::seconds(secs);
    }
    tracker.reset_at().unwrap_or_else(Utc::now)
}

/// Map a non-success status to the error taxonomy.
///
/// `resource` names what a 404 refers to.
pub fn check_status(
    response: &HttpResponse,
    tracker: &RateLimitTracker,
    resource: &str,
) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }

    let status = response.status;
    let quota_exhausted = status == 403 && is_quota_exhausted(&response.headers, &response.body);
    let err = match classify(&Outcome::Status {
        status,
        quota_exhausted,
    }) {
        Classification::Retryable => FetchError::retryable_status(status),
        Classification::RateLimited => FetchError::RateLimited {
            reset_at: rate_limit_reset(response, tracker),
        },
        Classification::Fatal => match status {
            401 => FetchError::Unauthenticated,
            403 => FetchError::forbidden(api_message(response)),
            404 => FetchError::not_found(resource),
            _ => FetchError::UnexpectedStatus {
                status,
                message: api_message(response),
            },
        },
    };

    tracing::debug!(status, resource, error = %err, "Request failed");
    Err(err)
}

/// Interpret one page response: status first, then the body.
pub fn interpret_response(
    response: &HttpResponse,
    tracker: &RateLimitTracker,
    resource: &str,
) -> Result<Vec<Repository>, FetchError> {
    check_status(response, tracker, resource)?;
    Repository::parse_page(&response.body)
}
