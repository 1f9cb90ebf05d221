//! Streaming delivery of starred repositories.
//!
//! A producer task drives the [`FetchSession`] and pushes records into a
//! bounded channel while the consumer works through earlier ones. Page
//! requests are still issued one at a time, in page order.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::FetchError;
use crate::repository::Repository;

use super::client::GitHubClient;
use super::pagination::{
    FetchOutcome, FetchSession, PageDecision, SessionSummary, Termination, cancel,
    check_username, complete, fail, report_next_page, report_page, report_start,
};

type Item = Result<Repository, FetchError>;

/// Incremental, finite, non-restartable sequence of starred repositories.
///
/// At most one error is yielded, as the last item. Dropping the stream stops
/// the producer at its next suspension point without issuing further requests.
#[derive(Debug)]
pub struct StarredStream {
    username: String,
    rx: mpsc::Receiver<Item>,
    handle: Option<JoinHandle<SessionSummary>>,
}

impl StarredStream {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Next record, or `None` once the session has ended.
    pub async fn next(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Stop consuming and wait for the producer's summary.
    ///
    /// If the session is still running it ends as [`Termination::Cancelled`].
    pub async fn finish(mut self) -> SessionSummary {
        self.rx.close();
        let Some(handle) = self.handle.take() else {
            return FetchSession::new(self.username, 1).finish(Termination::Cancelled);
        };
        match handle.await {
            Ok(summary) => summary,
            Err(e) => FetchSession::new(self.username, 1).finish(Termination::Error(
                FetchError::transport(format!("fetch task failed: {e}")),
            )),
        }
    }

    /// Drain the stream, keeping records gathered before any failure.
    pub async fn collect_outcome(mut self) -> FetchOutcome {
        let mut records = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(repo) => records.push(repo),
                Err(_) => break,
            }
        }
        let summary = self.finish().await;
        FetchOutcome { records, summary }
    }

    /// Drain the stream into a list, or the terminating error.
    pub async fn collect_all(self) -> Result<Vec<Repository>, FetchError> {
        self.collect_outcome().await.into_result()
    }
}

impl GitHubClient {
    /// Start streaming the starred repositories of `username`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn starred_stream(&self, username: &str) -> StarredStream {
        let (tx, rx) = mpsc::channel(self.config().page_size.max(1) as usize);
        let client = self.clone();
        let owned = username.to_string();
        let handle = tokio::spawn(async move { client.produce(owned, tx).await });

        StarredStream {
            username: username.to_string(),
            rx,
            handle: Some(handle),
        }
    }

    /// Fetch every starred repository of `username` through the streaming path.
    pub async fn fetch_all(&self, username: &str) -> Result<Vec<Repository>, FetchError> {
        self.starred_stream(username).collect_all().await
    }

    async fn produce(self, username: String, tx: mpsc::Sender<Item>) -> SessionSummary {
        let on_progress = self.progress();
        let mut session = FetchSession::new(username.as_str(), self.config().page_size);

        if let Err(err) = check_username(&username) {
            let _ = tx.send(Err(err.clone())).await;
            return fail(session, err, on_progress);
        }

        report_start(&session, on_progress);
        loop {
            let page = session.next_page();
            let result = tokio::select! {
                biased;
                _ = tx.closed() => return cancel(session, on_progress),
                result = self.fetch_page(&username, page, on_progress) => result,
            };

            let repos = match result {
                Ok(repos) => repos,
                Err(err) => {
                    // The consumer may already be gone; the summary still carries the error.
                    let _ = tx.send(Err(err.clone())).await;
                    return fail(session, err, on_progress);
                }
            };

            let count = repos.len();
            for (delivered, repo) in repos.into_iter().enumerate() {
                if tx.send(Ok(repo)).await.is_err() {
                    session.deliver_partial(delivered);
                    return cancel(session, on_progress);
                }
            }

            let decision = session.accept_page(count);
            report_page(&session, page, count, on_progress);
            if decision == PageDecision::Exhausted {
                return complete(session, on_progress);
            }

            let delay = self.config().request_delay();
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = tx.closed() => return cancel(session, on_progress),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            report_next_page(&session, on_progress);
        }
    }
}
