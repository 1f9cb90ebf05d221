//! Process-local rate-limit tracking.
//!
//! The tracker is updated from response headers after every request and
//! consulted before the next one. It is advisory: the authoritative signal is
//! always the status of the next response.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::{HttpHeaders, header_get};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_USED: &str = "x-ratelimit-used";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Snapshot of the tracked quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds; 0 when unknown.
    pub reset_at: i64,
    pub used: u64,
}

impl RateLimitState {
    /// Reset time, or `None` when unknown.
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        if self.reset_at <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.reset_at, 0)
    }
}

/// Shared, cheaply clonable rate-limit tracker.
///
/// Clones observe the same state. Reads may happen concurrently; writes are
/// serialized by the lock.
#[derive(Debug, Clone)]
pub struct RateLimitTracker {
    state: Arc<RwLock<RateLimitState>>,
}

impl RateLimitTracker {
    /// Start with the nominal quota and an unknown reset time.
    pub fn new(nominal_quota: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(RateLimitState {
                limit: nominal_quota,
                remaining: nominal_quota,
                reset_at: 0,
                used: 0,
            })),
        }
    }

    /// Update from response headers. Missing or invalid headers are ignored.
    pub fn observe(&self, headers: &HttpHeaders) {
        let parse_u64 =
            |name: &str| header_get(headers, name).and_then(|v| v.trim().parse::<u64>().ok());
        let limit = parse_u64(HEADER_LIMIT);
        let remaining = parse_u64(HEADER_REMAINING);
        let used = parse_u64(HEADER_USED);
        let reset = header_get(headers, HEADER_RESET).and_then(|v| v.trim().parse::<i64>().ok());

        if limit.is_none() && remaining.is_none() && used.is_none() && reset.is_none() {
            return;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(limit) = limit {
            state.limit = limit;
        }
        if let Some(remaining) = remaining {
            state.remaining = remaining;
        }
        if let Some(used) = used {
            state.used = used;
        }
        if let Some(reset) = reset {
            state.reset_at = reset;
        }
    }

    /// Overwrite the whole state, e.g. from a `/rate_limit` query.
    pub fn replace(&self, new_state: RateLimitState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = new_state;
    }

    /// Assume a fresh window after waiting out a reset.
    pub fn mark_window_reset(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.remaining = state.limit;
        state.used = 0;
    }

    pub fn snapshot(&self) -> RateLimitState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn remaining(&self) -> u64 {
        self.snapshot().remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().reset_time()
    }

    /// True when the quota is spent and the reset lies in the future.
    pub fn should_preemptively_wait(&self) -> bool {
        self.wait_duration(Utc::now()).is_some()
    }

    /// How long to sleep before the next request, measured from `now`.
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.snapshot();
        if state.remaining > 0 {
            return None;
        }
        let reset = state.reset_time()?;
        (reset - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Whether a 403 response reports quota exhaustion rather than a permission problem.
pub fn is_quota_exhausted(headers: &HttpHeaders, body: &[u8]) -> bool {
    if header_get(headers, HEADER_REMAINING).is_some_and(|v| v.trim() == "0") {
        return true;
    }
    if header_get(headers, HEADER_RETRY_AFTER).is_some() {
        return true;
    }
    String::from_utf8_lossy(body)
        .to_ascii_lowercase()
        .contains("rate limit")
}
