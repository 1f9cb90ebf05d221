//! Fetch configuration.
//!
//! A flat value object consumed by [`crate::GitHubClient`]. Loading it from
//! files or the environment is the caller's business; every field has a
//! default so partial sources deserialize cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest `per_page` the API accepts.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;
pub const DEFAULT_RATE_LIMIT: u64 = 5000;
pub const DEFAULT_MAX_RATE_LIMIT_WAIT_SECS: u64 = 3600;

/// Invalid configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("username must not be empty")]
    EmptyUsername,

    #[error("page size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    InvalidPageSize(u32),

    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whose stars to fetch when no username is passed explicitly.
    pub username: String,
    pub page_size: u32,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Backoff unit; retry `k` waits `retry_delay_ms * k`.
    pub retry_delay_ms: u64,
    /// Pause between successful page fetches.
    pub request_delay_ms: u64,
    /// Nominal quota used until the server reports real numbers.
    pub rate_limit: u64,
    /// `sort` query parameter.
    pub sort: String,
    /// `direction` query parameter.
    pub direction: String,
    /// Longest preemptive rate-limit sleep; beyond this the fetch fails instead.
    pub max_rate_limit_wait_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            rate_limit: DEFAULT_RATE_LIMIT,
            sort: "updated".to_string(),
            direction: "desc".to_string(),
            max_rate_limit_wait_secs: DEFAULT_MAX_RATE_LIMIT_WAIT_SECS,
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u64) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait_secs = wait.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.retry_delay())
    }

    /// Check page size and base URL. The username is checked per fetch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        let parsed = url::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus a non-empty username.
    pub fn validate_with_username(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        self.validate()
    }
}
