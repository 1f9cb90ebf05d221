//! Retry and backoff policy.
//!
//! Failures are classified into fatal, retryable and rate-limited. Only
//! retryable failures are tried again, with a linear backoff: the `k`-th
//! retry waits `base_delay * k`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, BlockingRetryable, Retryable};

use crate::error::{FetchError, short_error_message};
use crate::progress::{FetchProgress, ProgressCallback, emit};

/// How a failed request should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Fatal,
    Retryable,
    RateLimited,
}

/// A non-success outcome of one request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered with a non-2xx status.
    Status { status: u16, quota_exhausted: bool },
    /// No status was received (timeout, refused connection, ...).
    Transport,
    /// A 2xx status whose body could not be decoded.
    Malformed,
}

pub fn classify(outcome: &Outcome) -> Classification {
    match *outcome {
        Outcome::Transport | Outcome::Malformed => Classification::Retryable,
        Outcome::Status {
            status: 429 | 500 | 502 | 503 | 504,
            ..
        } => Classification::Retryable,
        Outcome::Status {
            status: 403,
            quota_exhausted: true,
        } => Classification::RateLimited,
        Outcome::Status { .. } => Classification::Fatal,
    }
}

/// Retry ceiling and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit; retry `k` waits `base_delay * k`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total attempts including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn into_backoff(self) -> LinearBuilder {
        LinearBuilder {
            base: self.base_delay,
            max_times: self.max_retries,
        }
    }
}

/// Builder for [`LinearBackoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBuilder {
    base: Duration,
    max_times: u32,
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            base: self.base,
            max_times: self.max_times,
            attempt: 0,
        }
    }
}

/// Yields `base * 1`, `base * 2`, ... up to `max_times` delays.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    max_times: u32,
    attempt: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_times {
            return None;
        }
        self.attempt += 1;
        Some(self.base.saturating_mul(self.attempt))
    }
}

fn report_retry(
    target: &str,
    attempt: u32,
    delay: Duration,
    err: &FetchError,
    on_progress: Option<&ProgressCallback>,
) {
    let error = short_error_message(err);
    tracing::warn!(
        target_resource = target,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "Request failed, retrying"
    );
    emit(
        on_progress,
        FetchProgress::RetryBackoff {
            target: target.to_string(),
            delay,
            attempt,
            error,
        },
    );
}

/// Run an async operation under the retry policy.
///
/// Only errors for which [`FetchError::is_retryable`] holds are tried again.
/// When the ceiling is hit, the last error is returned with the attempt
/// count filled in.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    target: &str,
    on_progress: Option<&ProgressCallback>,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .when(FetchError::is_retryable)
        .notify(|err, dur| {
            report_retry(
                target,
                attempt.load(Ordering::SeqCst),
                dur,
                err,
                on_progress,
            );
        })
        .await
        .map_err(|e| e.with_attempts(attempt.load(Ordering::SeqCst)))
}

/// Blocking counterpart of [`with_retry`]; sleeps on the calling thread.
pub fn with_retry_blocking<T, F>(
    config: RetryConfig,
    target: &str,
    on_progress: Option<&ProgressCallback>,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Result<T, FetchError>,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .sleep(std::thread::sleep)
        .when(FetchError::is_retryable)
        .notify(|err, dur| {
            report_retry(
                target,
                attempt.load(Ordering::SeqCst),
                dur,
                err,
                on_progress,
            );
        })
        .call()
        .map_err(|e| e.with_attempts(attempt.load(Ordering::SeqCst)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn classify_statuses() {
        let status = |status, quota_exhausted| Outcome::Status {
            status,
            quota_exhausted,
        };

        for code in [429, 500, 502, 503, 504] {
            assert_eq!(classify(&status(code, false)), Classification::Retryable);
        }
        assert_eq!(classify(&Outcome::Transport), Classification::Retryable);
        assert_eq!(classify(&Outcome::Malformed), Classification::Retryable);

        assert_eq!(classify(&status(401, false)), Classification::Fatal);
        assert_eq!(classify(&status(403, false)), Classification::Fatal);
        assert_eq!(classify(&status(403, true)), Classification::RateLimited);
        assert_eq!(classify(&status(404, false)), Classification::Fatal);
        assert_eq!(classify(&status(422, false)), Classification::Fatal);
        assert_eq!(classify(&status(501, false)), Classification::Fatal);
    }

    #[test]
    fn linear_backoff_schedule() {
        let delays: Vec<Duration> = RetryConfig::new(3, Duration::from_millis(250))
            .into_backoff()
            .build()
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750),
            ]
        );
    }

    #[test]
    fn zero_retries_yields_no_delays() {
        let mut backoff = RetryConfig::new(0, Duration::from_secs(1))
            .into_backoff()
            .build();
        assert_eq!(backoff.next(), None);
        assert_eq!(RetryConfig::new(0, Duration::from_secs(1)).max_attempts(), 1);
    }

    #[test]
    fn default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }

    fn capture_events() -> (Arc<Mutex<Vec<FetchProgress>>>, ProgressCallback) {
        let events: Arc<Mutex<Vec<FetchProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            capture.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });
        (events, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_recovers_and_emits_progress() {
        let calls = Arc::new(AtomicU32::new(0));
        let (events, callback) = capture_events();

        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchError::retryable_status(503))
                } else {
                    Ok(42u32)
                }
            }
        };

        let started = tokio::time::Instant::now();
        let result = with_retry(
            RetryConfig::new(3, Duration::from_secs(1)),
            "page 1",
            Some(&callback),
            operation,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of linear backoff.
        assert!(started.elapsed() >= Duration::from_secs(3));

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        let delays: Vec<(u32, Duration)> = events
            .iter()
            .filter_map(|e| match e {
                FetchProgress::RetryBackoff { attempt, delay, .. } => Some((*attempt, *delay)),
                _ => None,
            })
            .collect();
        assert_eq!(
            delays,
            vec![(1, Duration::from_secs(1)), (2, Duration::from_secs(2))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_surfaces_last_status_after_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                let status = if n == 0 { 503 } else { 429 };
                Err::<(), _>(FetchError::retryable_status(status))
            }
        };

        let err = with_retry(
            RetryConfig::new(2, Duration::from_millis(10)),
            "page 1",
            None,
            operation,
        )
        .await
        .expect_err("should exhaust retries");

        assert_eq!(
            err,
            FetchError::RetriesExhausted {
                status: 429,
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_fatal_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Unauthenticated)
            }
        };

        let err = with_retry(RetryConfig::default(), "page 1", None, operation)
            .await
            .expect_err("expected error");

        assert_eq!(err, FetchError::Unauthenticated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_retry_blocking_retries_transport_errors() {
        let mut calls = 0u32;
        let (events, callback) = capture_events();

        let result = with_retry_blocking(
            RetryConfig::new(3, Duration::from_millis(1)),
            "page 2",
            Some(&callback),
            || {
                calls += 1;
                if calls == 1 {
                    Err(FetchError::transport("connection reset"))
                } else {
                    Ok("done")
                }
            },
        );

        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 2);
        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            FetchProgress::RetryBackoff { target, attempt: 1, .. } if target == "page 2"
        ));
    }

    #[test]
    fn with_retry_blocking_never_retries_rate_limits() {
        let mut calls = 0u32;
        let reset_at = chrono::Utc::now();
        let err = with_retry_blocking(
            RetryConfig::new(3, Duration::from_millis(1)),
            "page 1",
            None,
            || {
                calls += 1;
                Err::<(), _>(FetchError::RateLimited { reset_at })
            },
        )
        .expect_err("expected error");

        assert!(err.is_rate_limited());
        assert_eq!(calls, 1);
    }
}
