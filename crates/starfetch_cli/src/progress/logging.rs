use starfetch::FetchProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: FetchProgress) {
        match event {
            FetchProgress::FetchingPage { username, page } => {
                if page == 1 {
                    tracing::info!(username = %username, "Fetching starred repositories");
                }
                tracing::debug!(username = %username, page, "Fetching page");
            }

            FetchProgress::FetchedPage {
                username,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(username = %username, page, count, total_so_far, "Fetched page");
            }

            FetchProgress::RetryBackoff {
                target,
                delay,
                attempt,
                error,
            } => {
                tracing::warn!(
                    target_resource = %target,
                    retry_after_ms = delay.as_millis() as u64,
                    attempt,
                    error = %error,
                    "Request failed, backing off"
                );
            }

            FetchProgress::RateLimitWait { wait, reset_at } => {
                tracing::warn!(
                    wait_secs = wait.as_secs(),
                    reset_at,
                    "Rate limit exhausted, waiting for reset"
                );
            }

            FetchProgress::FetchComplete {
                username,
                pages,
                total,
            } => {
                tracing::info!(username = %username, pages, total, "Fetch complete");
            }

            FetchProgress::FetchFailed {
                username,
                delivered,
                error,
            } => {
                tracing::error!(username = %username, delivered, error = %error, "Fetch failed");
            }

            FetchProgress::FetchCancelled {
                username,
                delivered,
            } => {
                tracing::warn!(username = %username, delivered, "Fetch cancelled");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
