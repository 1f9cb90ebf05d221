//! Starfetch - fetch every repository a GitHub user has starred.
//!
//! The library is the fetch engine: pagination, rate-limit tracking and a
//! retry/backoff policy, offered in a blocking form and a streaming form that
//! produce the same records in the same order. Storage, analysis and
//! rendering of the records are left to callers.
//!
//! # Features
//!
//! - `reqwest` (default) - Real HTTP transports backed by reqwest. Without it,
//!   callers inject their own [`http::HttpTransport`] or
//!   [`http::BlockingHttpTransport`].
//!
//! # Example
//!
//! ```ignore
//! use starfetch::{FetchConfig, GitHubClient};
//!
//! let config = FetchConfig::new("octocat");
//! let client = GitHubClient::new(config, std::env::var("GITHUB_TOKEN").ok())?;
//! let repos = client.fetch_all("octocat").await?;
//! ```

pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod progress;
pub mod rate_limit;
pub mod repository;
pub mod retry;

pub use config::{ConfigError, FetchConfig};
pub use error::{FetchError, ParseError, short_error_message};
pub use github::{
    ClientError, FetchOutcome, GitHubClient, SessionSummary, StarredStream, Termination,
};
pub use progress::{FetchProgress, ProgressCallback};
pub use rate_limit::{RateLimitState, RateLimitTracker};
pub use repository::{License, Repository};
