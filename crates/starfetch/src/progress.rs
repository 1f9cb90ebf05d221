//! Progress events emitted while fetching starred repositories.
//!
//! The fetcher itself never prints anything; front ends install a
//! [`ProgressCallback`] and render these events however they like.

use std::time::Duration;

/// Progress events emitted during a fetch session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchProgress {
    /// About to request a page.
    FetchingPage {
        /// The user whose stars are being fetched.
        username: String,
        /// Page number (1-indexed).
        page: u32,
    },

    /// A page was accepted.
    FetchedPage {
        username: String,
        page: u32,
        /// Records on this page.
        count: usize,
        /// Running total of records so far.
        total_so_far: usize,
    },

    /// A retryable failure; backing off before the next attempt.
    RetryBackoff {
        /// What was being requested (a page label or a URL path).
        target: String,
        /// Time to wait before the next attempt.
        delay: Duration,
        /// The attempt that just failed (1-indexed).
        attempt: u32,
        /// Short description of the failure.
        error: String,
    },

    /// Quota exhausted; sleeping until the window resets.
    RateLimitWait {
        /// Time to wait.
        wait: Duration,
        /// Epoch seconds at which the window resets.
        reset_at: i64,
    },

    /// All pages were fetched.
    FetchComplete {
        username: String,
        pages: u32,
        total: usize,
    },

    /// The session ended with an error.
    FetchFailed {
        username: String,
        /// Records delivered before the failure.
        delivered: usize,
        error: String,
    },

    /// The consumer went away before the last page.
    FetchCancelled { username: String, delivered: usize },
}

/// Callback for progress updates during a fetch.
pub type ProgressCallback = Box<dyn Fn(FetchProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: FetchProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
