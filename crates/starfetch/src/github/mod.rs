//! GitHub REST client for a user's starred repositories.
//!
//! # Module Structure
//!
//! - `client` - Client construction, request building and
//!   response interpretation
//! - `pagination` - The fetch session and the blocking form
//! - `stream` - The streaming form
//! - `types` - Rate limit payloads
//!
//! # Example
//!
//! ```ignore
//! use starfetch::{FetchConfig, GitHubClient};
//!
//! let client = GitHubClient::new(FetchConfig::new("octocat"), None)?;
//! let mut stream = client.starred_stream("octocat");
//! while let Some(repo) = stream.next().await {
//!     println!("{}", repo?.full_name);
//! }
//! ```

mod client;
mod pagination;
mod stream;
mod types;

pub use client::{ACCEPT, ClientError, GitHubClient, check_status, interpret_response};
pub use pagination::{FetchOutcome, FetchSession, PageDecision, SessionSummary, Termination};
pub use stream::StarredStream;
pub use types::{GitHubRateLimitResponse, GitHubRateLimits, RateLimitResource};
