use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use starfetch::FetchProgress;

/// Interactive progress reporter using indicatif.
///
/// One spinner per username being fetched. Retry and rate-limit notices are
/// printed above the spinners.
pub struct InteractiveReporter {
    multi: MultiProgress,
    fetch_bars: Mutex<HashMap<String, ProgressBar>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            fetch_bars: Mutex::new(HashMap::new()),
        }
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            fetch_bars: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_for(&self, bars: &mut HashMap<String, ProgressBar>, username: &str) -> ProgressBar {
        bars.entry(username.to_string())
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_prefix(format!("{:12}", username));
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            })
            .clone()
    }

    pub fn handle(&self, event: FetchProgress) {
        let mut bars = self.fetch_bars.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            FetchProgress::FetchingPage { username, page } => {
                let pb = self.spinner_for(&mut bars, &username);
                pb.set_message(format!("Fetching page {}...", page));
            }

            FetchProgress::FetchedPage {
                username,
                page,
                count: _,
                total_so_far,
            } => {
                let pb = self.spinner_for(&mut bars, &username);
                pb.set_position(total_so_far as u64);
                pb.set_message(format!("Page {} ({} repos)", page, total_so_far));
            }

            FetchProgress::RetryBackoff {
                target,
                delay,
                attempt,
                error,
            } => {
                self.println(&format!(
                    "⟳ {}: {} (attempt {}, retrying in {:.1}s)",
                    target,
                    error,
                    attempt,
                    delay.as_secs_f64()
                ));
            }

            FetchProgress::RateLimitWait { wait, reset_at: _ } => {
                for pb in bars.values() {
                    pb.set_message(format!("Rate limited, waiting {}s for reset...", wait.as_secs()));
                }
            }

            FetchProgress::FetchComplete {
                username,
                pages,
                total,
            } => {
                if let Some(pb) = bars.remove(&username) {
                    pb.finish_with_message(format!("✓ {} starred repos ({} pages)", total, pages));
                }
            }

            FetchProgress::FetchFailed {
                username,
                delivered,
                error,
            } => {
                if let Some(pb) = bars.remove(&username) {
                    pb.abandon_with_message(format!("✗ {} (after {} repos)", error, delivered));
                }
            }

            FetchProgress::FetchCancelled {
                username,
                delivered,
            } => {
                if let Some(pb) = bars.remove(&username) {
                    pb.abandon_with_message(format!("Cancelled after {} repos", delivered));
                }
            }

            _ => {}
        }
    }

    pub fn println(&self, message: &str) {
        if self.multi.println(message).is_err() {
            eprintln!("{}", message);
        }
    }

    pub fn finish(&self) {
        let mut bars = self.fetch_bars.lock().unwrap_or_else(|e| e.into_inner());
        for (_, pb) in bars.drain() {
            pb.finish_and_clear();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(reporter: &InteractiveReporter) -> usize {
        reporter.fetch_bars.lock().expect("lock").len()
    }

    #[test]
    fn spinner_lives_for_the_session() {
        let reporter = InteractiveReporter::hidden();
        reporter.handle(FetchProgress::FetchingPage {
            username: "octocat".to_string(),
            page: 1,
        });
        reporter.handle(FetchProgress::FetchedPage {
            username: "octocat".to_string(),
            page: 1,
            count: 100,
            total_so_far: 100,
        });
        reporter.handle(FetchProgress::RetryBackoff {
            target: "page 2".to_string(),
            delay: Duration::from_secs(1),
            attempt: 1,
            error: "HTTP 503".to_string(),
        });
        assert_eq!(active(&reporter), 1);

        reporter.handle(FetchProgress::FetchComplete {
            username: "octocat".to_string(),
            pages: 2,
            total: 100,
        });
        assert_eq!(active(&reporter), 0);
    }

    #[test]
    fn failed_and_cancelled_sessions_release_their_spinner() {
        let reporter = InteractiveReporter::hidden();
        for username in ["octocat", "hubot"] {
            reporter.handle(FetchProgress::FetchingPage {
                username: username.to_string(),
                page: 1,
            });
        }
        assert_eq!(active(&reporter), 2);

        reporter.handle(FetchProgress::FetchFailed {
            username: "octocat".to_string(),
            delivered: 0,
            error: "not found".to_string(),
        });
        reporter.handle(FetchProgress::FetchCancelled {
            username: "hubot".to_string(),
            delivered: 3,
        });
        assert_eq!(active(&reporter), 0);
    }

    #[test]
    fn finish_clears_remaining_spinners() {
        let reporter = InteractiveReporter::hidden();
        reporter.handle(FetchProgress::FetchingPage {
            username: "octocat".to_string(),
            page: 1,
        });
        reporter.finish();
        assert_eq!(active(&reporter), 0);
    }
}
