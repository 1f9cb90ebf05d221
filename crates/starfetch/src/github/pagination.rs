//! Page-by-page retrieval of starred repositories.
//!
//! [`FetchSession`] is the pagination state machine. Both delivery forms (the
//! blocking one here and the streaming one in the `stream` module) drive the
//! same session and report through the same helpers, so they stop on the
//! same page and emit the same records in the same order.

use crate::error::FetchError;
use crate::progress::{FetchProgress, ProgressCallback, emit};
use crate::repository::Repository;

use super::client::GitHubClient;

/// What to do after a page was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    Continue,
    /// The page was short (or empty); there is nothing after it.
    Exhausted,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exhausted,
    Error(FetchError),
    Cancelled,
}

/// Final accounting for one session.
///
/// `records` is the count to resume from after an error or cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub username: String,
    /// Pages accepted.
    pub pages: u32,
    /// Records handed to the consumer.
    pub records: usize,
    pub termination: Termination,
}

impl SessionSummary {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Exhausted
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.termination {
            Termination::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Records plus the session summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub records: Vec<Repository>,
    pub summary: SessionSummary,
}

impl FetchOutcome {
    /// Records on success, the terminating error otherwise.
    pub fn into_result(self) -> Result<Vec<Repository>, FetchError> {
        match self.summary.termination {
            Termination::Error(err) => Err(err),
            Termination::Exhausted | Termination::Cancelled => Ok(self.records),
        }
    }
}

/// Pagination state for one "all stars of user X" call.
#[derive(Debug, Clone)]
pub struct FetchSession {
    username: String,
    page_size: u32,
    page: u32,
    pages_fetched: u32,
    accumulated: usize,
}

impl FetchSession {
    pub fn new(username: impl Into<String>, page_size: u32) -> Self {
        Self {
            username: username.into(),
            page_size: page_size.max(1),
            page: 1,
            pages_fetched: 0,
            accumulated: 0,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Page to request next (1-indexed).
    pub fn next_page(&self) -> u32 {
        self.page
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Record a page of `count` records and decide whether to continue.
    ///
    /// A short page ends the session. An empty page is always short.
    pub fn accept_page(&mut self, count: usize) -> PageDecision {
        self.pages_fetched += 1;
        self.accumulated += count;
        if count < self.page_size as usize {
            PageDecision::Exhausted
        } else {
            self.page += 1;
            PageDecision::Continue
        }
    }

    /// Count records delivered from a page that was not fully consumed.
    pub fn deliver_partial(&mut self, delivered: usize) {
        self.accumulated += delivered;
    }

    pub fn finish(self, termination: Termination) -> SessionSummary {
        SessionSummary {
            username: self.username,
            pages: self.pages_fetched,
            records: self.accumulated,
            termination,
        }
    }
}

pub(crate) fn check_username(username: &str) -> Result<(), FetchError> {
    if username.trim().is_empty() {
        return Err(FetchError::not_found("user (empty username)"));
    }
    Ok(())
}

pub(crate) fn report_start(session: &FetchSession, on_progress: Option<&ProgressCallback>) {
    tracing::info!(
        username = session.username(),
        page_size = session.page_size,
        "Fetching starred repositories"
    );
    emit(
        on_progress,
        FetchProgress::FetchingPage {
            username: session.username().to_string(),
            page: session.next_page(),
        },
    );
}

pub(crate) fn report_next_page(session: &FetchSession, on_progress: Option<&ProgressCallback>) {
    emit(
        on_progress,
        FetchProgress::FetchingPage {
            username: session.username().to_string(),
            page: session.next_page(),
        },
    );
}

pub(crate) fn report_page(
    session: &FetchSession,
    page: u32,
    count: usize,
    on_progress: Option<&ProgressCallback>,
) {
    tracing::debug!(page, count, total = session.accumulated(), "Fetched page");
    emit(
        on_progress,
        FetchProgress::FetchedPage {
            username: session.username().to_string(),
            page,
            count,
            total_so_far: session.accumulated(),
        },
    );
}

pub(crate) fn complete(
    session: FetchSession,
    on_progress: Option<&ProgressCallback>,
) -> SessionSummary {
    let summary = session.finish(Termination::Exhausted);
    tracing::info!(
        username = %summary.username,
        pages = summary.pages,
        count = summary.records,
        "Fetched all starred repositories"
    );
    emit(
        on_progress,
        FetchProgress::FetchComplete {
            username: summary.username.clone(),
            pages: summary.pages,
            total: summary.records,
        },
    );
    summary
}

pub(crate) fn fail(
    session: FetchSession,
    err: FetchError,
    on_progress: Option<&ProgressCallback>,
) -> SessionSummary {
    let message = crate::error::short_error_message(&err);
    let summary = session.finish(Termination::Error(err));
    tracing::warn!(
        username = %summary.username,
        pages = summary.pages,
        count = summary.records,
        error = %message,
        "Fetch failed"
    );
    emit(
        on_progress,
        FetchProgress::FetchFailed {
            username: summary.username.clone(),
            delivered: summary.records,
            error: message,
        },
    );
    summary
}

pub(crate) fn cancel(
    session: FetchSession,
    on_progress: Option<&ProgressCallback>,
) -> SessionSummary {
    let summary = session.finish(Termination::Cancelled);
    tracing::info!(
        username = %summary.username,
        count = summary.records,
        "Fetch cancelled by consumer"
    );
    emit(
        on_progress,
        FetchProgress::FetchCancelled {
            username: summary.username.clone(),
            delivered: summary.records,
        },
    );
    summary
}

impl GitHubClient {
    /// Fetch every starred repository of `username`, blocking the calling thread.
    pub fn fetch_all_blocking(&self, username: &str) -> Result<Vec<Repository>, FetchError> {
        self.fetch_all_blocking_with_progress(username, self.progress())
    }

    /// Like [`fetch_all_blocking`](Self::fetch_all_blocking) with an explicit callback.
    pub fn fetch_all_blocking_with_progress(
        &self,
        username: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<Repository>, FetchError> {
        self.fetch_outcome_blocking(username, on_progress)
            .into_result()
    }

    /// Blocking fetch that keeps the records gathered before a failure.
    pub fn fetch_outcome_blocking(
        &self,
        username: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> FetchOutcome {
        let mut session = FetchSession::new(username, self.config().page_size);
        let mut records = Vec::new();

        if let Err(err) = check_username(username) {
            let summary = fail(session, err, on_progress);
            return FetchOutcome { records, summary };
        }

        report_start(&session, on_progress);
        loop {
            let page = session.next_page();
            let repos = match self.fetch_page_blocking(username, page, on_progress) {
                Ok(repos) => repos,
                Err(err) => {
                    let summary = fail(session, err, on_progress);
                    return FetchOutcome { records, summary };
                }
            };

            let count = repos.len();
            records.extend(repos);
            let decision = session.accept_page(count);
            report_page(&session, page, count, on_progress);
            if decision == PageDecision::Exhausted {
                break;
            }

            let delay = self.config().request_delay();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            report_next_page(&session, on_progress);
        }

        let summary = complete(session, on_progress);
        FetchOutcome { records, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use crate::config::FetchConfig;
    use crate::http::{HttpResponse, MockTransport};
    use crate::rate_limit::RateLimitState;

    const BASE: &str = "https://api.test";

    fn page_url(page: u32, per_page: u32) -> String {
        format!(
            "{BASE}/users/octocat/starred?per_page={per_page}&page={page}&sort=updated&direction=desc"
        )
    }

    fn page_body(ids: std::ops::Range<u64>) -> Vec<u8> {
        let items: Vec<serde_json::Value> = ids
            .map(|id| {
                json!({
                    "id": id,
                    "name": format!("repo-{id}"),
                    "full_name": format!("owner/repo-{id}"),
                    "html_url": format!("https://github.com/owner/repo-{id}"),
                    "stargazers_count": 1,
                })
            })
            .collect();
        serde_json::to_vec(&items).expect("serialize page")
    }

    fn ok(body: Vec<u8>) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn client(transport: &MockTransport, page_size: u32) -> GitHubClient {
        let config = FetchConfig::new("octocat")
            .with_base_url(BASE)
            .with_page_size(page_size)
            .with_retry_delay(Duration::from_millis(1))
            .with_request_delay(Duration::ZERO);
        GitHubClient::with_blocking_transport(config, None, Arc::new(transport.clone()))
            .expect("client")
    }

    #[test]
    fn session_continues_on_full_pages_and_stops_on_short_ones() {
        let mut session = FetchSession::new("octocat", 3);
        assert_eq!(session.next_page(), 1);
        assert_eq!(session.accept_page(3), PageDecision::Continue);
        assert_eq!(session.next_page(), 2);
        assert_eq!(session.accept_page(2), PageDecision::Exhausted);
        assert_eq!(session.accumulated(), 5);
        assert_eq!(session.pages_fetched(), 2);

        let summary = session.finish(Termination::Exhausted);
        assert!(summary.is_complete());
        assert_eq!(summary.records, 5);
        assert_eq!(summary.pages, 2);
    }

    #[test]
    fn session_stops_on_empty_page() {
        let mut session = FetchSession::new("octocat", 1);
        assert_eq!(session.accept_page(1), PageDecision::Continue);
        assert_eq!(session.accept_page(0), PageDecision::Exhausted);
        assert_eq!(session.accumulated(), 1);
    }

    #[test]
    fn partial_delivery_counts_towards_resume_point() {
        let mut session = FetchSession::new("octocat", 10);
        session.accept_page(10);
        session.deliver_partial(4);
        let summary = session.finish(Termination::Cancelled);
        assert_eq!(summary.records, 14);
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.error(), None);
    }

    #[test]
    fn outcome_into_result() {
        let session = FetchSession::new("octocat", 10);
        let outcome = FetchOutcome {
            records: Vec::new(),
            summary: session.finish(Termination::Error(FetchError::Unauthenticated)),
        };
        assert_eq!(outcome.into_result(), Err(FetchError::Unauthenticated));
    }

    #[test]
    fn blocking_fetch_uses_ceil_pages_plus_one_when_evenly_divisible() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), ok(page_body(0..2)));
        transport.push_response(page_url(2, 2), ok(page_body(2..4)));
        transport.push_response(page_url(3, 2), ok(page_body(0..0)));

        let repos = client(&transport, 2)
            .fetch_all_blocking("octocat")
            .expect("fetch");
        let ids: Vec<u64> = repos.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn blocking_fetch_stops_on_short_page() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), ok(page_body(0..2)));
        transport.push_response(page_url(2, 2), ok(page_body(2..3)));

        let repos = client(&transport, 2)
            .fetch_all_blocking("octocat")
            .expect("fetch");
        assert_eq!(repos.len(), 3);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn blocking_fetch_zero_stars_is_empty() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), ok(page_body(0..0)));

        let repos = client(&transport, 2)
            .fetch_all_blocking("octocat")
            .expect("fetch");
        assert!(repos.is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn blocking_fetch_unauthenticated_is_not_retried() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), ok(page_body(0..2)));
        transport.push_response(page_url(2, 2), status(401));

        let outcome = client(&transport, 2).fetch_outcome_blocking("octocat", None);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.summary.records, 2);
        assert_eq!(outcome.summary.error(), Some(&FetchError::Unauthenticated));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn blocking_fetch_retries_then_succeeds() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), status(503));
        transport.push_response(page_url(1, 2), status(429));
        transport.push_response(page_url(1, 2), ok(page_body(0..1)));

        let repos = client(&transport, 2)
            .fetch_all_blocking("octocat")
            .expect("fetch");
        assert_eq!(repos.len(), 1);
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn blocking_fetch_empty_username_is_not_found_without_requests() {
        let transport = MockTransport::new();
        let err = client(&transport, 2)
            .fetch_all_blocking("  ")
            .expect_err("empty username");
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn blocking_fetch_waits_for_rate_limit_reset() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 2), ok(page_body(0..1)));

        let client = client(&transport, 2);
        let reset = Utc::now().timestamp() + 1;
        client.tracker().replace(RateLimitState {
            limit: 60,
            remaining: 0,
            reset_at: reset,
            used: 60,
        });

        let repos = client.fetch_all_blocking("octocat").expect("fetch");
        assert_eq!(repos.len(), 1);
        assert!(Utc::now().timestamp() >= reset);
        assert_eq!(client.tracker().remaining(), 60);
    }

    #[test]
    fn blocking_fetch_delays_next_page_after_headers_exhaust_quota() {
        let transport = MockTransport::new();
        let reset = Utc::now().timestamp() + 2;
        transport.push_response(
            page_url(1, 2),
            HttpResponse {
                status: 200,
                headers: vec![
                    ("X-RateLimit-Limit".to_string(), "60".to_string()),
                    ("X-RateLimit-Remaining".to_string(), "0".to_string()),
                    ("X-RateLimit-Reset".to_string(), reset.to_string()),
                ],
                body: page_body(0..2),
            },
        );
        transport.push_response(page_url(2, 2), ok(page_body(2..3)));

        let pages: Arc<Mutex<Vec<(u32, std::time::Instant)>>> = Arc::new(Mutex::new(Vec::new()));
        let waits: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let (capture_pages, capture_waits) = (Arc::clone(&pages), Arc::clone(&waits));
        let client = client(&transport, 2).with_progress(Box::new(move |event| match event {
            FetchProgress::FetchedPage { page, .. } => capture_pages
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((page, std::time::Instant::now())),
            FetchProgress::RateLimitWait { reset_at, .. } => capture_waits
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(reset_at),
            _ => {}
        }));

        let repos = client.fetch_all_blocking("octocat").expect("fetch");

        assert_eq!(repos.len(), 3);
        assert_eq!(transport.requests().len(), 2);
        assert!(Utc::now().timestamp() >= reset);
        assert_eq!(*waits.lock().expect("lock"), vec![reset]);
        let pages = pages.lock().expect("lock");
        assert_eq!(pages.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![1, 2]);
        assert!(pages[1].1 - pages[0].1 >= Duration::from_millis(900));
    }

    #[test]
    fn blocking_fetch_emits_progress_in_order() {
        let transport = MockTransport::new();
        transport.push_response(page_url(1, 1), ok(page_body(0..1)));
        transport.push_response(page_url(2, 1), ok(page_body(0..0)));

        let events: Arc<Mutex<Vec<FetchProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&events);
        let client = client(&transport, 1).with_progress(Box::new(move |event| {
            capture.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        }));

        client.fetch_all_blocking("octocat").expect("fetch");

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        let username = "octocat".to_string();
        assert_eq!(
            *events,
            vec![
                FetchProgress::FetchingPage {
                    username: username.clone(),
                    page: 1
                },
                FetchProgress::FetchedPage {
                    username: username.clone(),
                    page: 1,
                    count: 1,
                    total_so_far: 1
                },
                FetchProgress::FetchingPage {
                    username: username.clone(),
                    page: 2
                },
                FetchProgress::FetchedPage {
                    username: username.clone(),
                    page: 2,
                    count: 0,
                    total_so_far: 1
                },
                FetchProgress::FetchComplete {
                    username,
                    pages: 2,
                    total: 1
                },
            ]
        );
    }
}
