//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitState;

/// A single rate limit resource entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: u64,
    /// Requests used in current period.
    #[serde(default)]
    pub used: u64,
    /// Remaining requests in current period.
    pub remaining: u64,
    /// Unix timestamp when the rate limit resets.
    pub reset: u64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset as i64, 0).unwrap_or_else(Utc::now)
    }
}

impl From<&RateLimitResource> for RateLimitState {
    fn from(resource: &RateLimitResource) -> Self {
        Self {
            limit: resource.limit,
            remaining: resource.remaining,
            reset_at: resource.reset as i64,
            used: resource.used,
        }
    }
}

/// Rate limit resources reported by `/rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRateLimits {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    pub search: RateLimitResource,
    #[serde(default)]
    pub code_search: Option<RateLimitResource>,
    #[serde(default)]
    pub graphql: Option<RateLimitResource>,
}

/// Full rate limit response from GitHub's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRateLimitResponse {
    pub resources: GitHubRateLimits,
}

/// Payload of the contents and readme endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}
