use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::Term;

/// Global shutdown flag for graceful termination.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check if shutdown has been requested.
#[inline]
pub(crate) fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Acquire)
}

/// Request shutdown.
#[inline]
fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
}

/// Resolve once shutdown has been requested.
pub(crate) async fn shutdown_requested() {
    while !is_shutdown_requested() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C cancels the fetch in progress; the second exits at once.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, stopping after the current page...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, stopping after the current page");
        }

        request_shutdown();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn shutdown_requested_resolves_after_request() {
        let waiter = tokio::spawn(shutdown_requested());
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(!waiter.is_finished());

        request_shutdown();
        tokio::time::timeout(POLL_INTERVAL * 4, waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter should not panic");
        assert!(is_shutdown_requested());
    }
}
