use std::future::Future;
use std::sync::Arc;

use starfetch::{
    FetchConfig, FetchOutcome, GitHubClient, Repository, SessionSummary, StarredStream,
    Termination,
};

use crate::commands::{OutputFormat, print_json, print_table, truncate};
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown;

const DESCRIPTION_WIDTH: usize = 60;

/// Options for the stars command.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct StarsOptions {
    /// GitHub username (default: fetch.username from config, or GITHUB_USERNAME)
    pub username: Option<String>,

    /// Use the blocking fetcher instead of the streaming one
    #[arg(long)]
    pub blocking: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Stop after this many repositories
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Results per page (1-100)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Retries per request for rate limiting, server errors and network faults
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl StarsOptions {
    /// Apply flag overrides on top of the loaded configuration.
    fn apply(&self, mut fetch: FetchConfig, username: &str) -> FetchConfig {
        if let Some(page_size) = self.page_size {
            fetch = fetch.with_page_size(page_size);
        }
        if let Some(max_retries) = self.max_retries {
            fetch = fetch.with_max_retries(max_retries);
        }
        fetch.with_username(username)
    }
}

/// Handle the stars command.
pub(crate) async fn handle_stars(
    opts: StarsOptions,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let username = config.username(opts.username.as_deref()).ok_or(
        "No username given. Pass USERNAME, or set fetch.username in the config file \
         or GITHUB_USERNAME in the environment.",
    )?;
    let fetch_config = opts.apply(config.fetch.clone(), &username);
    fetch_config.validate_with_username()?;
    let token = config.github_token();

    let reporter = Arc::new(ProgressReporter::new());
    let mut outcome = if opts.blocking {
        fetch_blocking(fetch_config, token, &username, Arc::clone(&reporter)).await?
    } else {
        let client =
            GitHubClient::new(fetch_config, token)?.with_progress(reporter.as_callback());
        let stream = client.starred_stream(&username);
        collect_stream(stream, opts.limit, shutdown::shutdown_requested()).await
    };

    if let Some(message) = status_message(&outcome, opts.limit) {
        reporter.println(&message);
    }
    reporter.finish();

    if let Some(limit) = opts.limit {
        outcome.records.truncate(limit);
    }
    print_repositories(&outcome.records, opts.format)?;
    tracing::info!(
        username = %username,
        total = outcome.records.len(),
        "Printed starred repositories"
    );

    match outcome.summary.termination {
        Termination::Error(err) => Err(err.into()),
        Termination::Exhausted | Termination::Cancelled => Ok(()),
    }
}

/// Run the blocking fetcher on a worker thread.
///
/// The blocking client owns a runtime of its own, so it is created and
/// dropped off the async executor.
async fn fetch_blocking(
    fetch_config: FetchConfig,
    token: Option<String>,
    username: &str,
    reporter: Arc<ProgressReporter>,
) -> Result<FetchOutcome, Box<dyn std::error::Error>> {
    let username = username.to_string();
    let outcome = tokio::task::spawn_blocking(move || {
        let client = GitHubClient::new_blocking(fetch_config, token)?;
        let callback = reporter.as_callback();
        Ok::<_, starfetch::ClientError>(client.fetch_outcome_blocking(&username, Some(&callback)))
    })
    .await??;
    Ok(outcome)
}

/// Drain a stream until it ends, `limit` records arrive, or `shutdown` resolves.
///
/// Stopping early drops the rest of the session; no further pages are
/// requested.
pub(crate) async fn collect_stream(
    mut stream: StarredStream,
    limit: Option<usize>,
    shutdown: impl Future<Output = ()>,
) -> FetchOutcome {
    tokio::pin!(shutdown);
    let mut records = Vec::new();

    loop {
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        let item = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(repo)) => records.push(repo),
            Some(Err(_)) | None => break,
        }
    }

    let summary = stream.finish().await;
    FetchOutcome { records, summary }
}

/// What to tell the user about a session that did not simply run to the end.
fn status_message(outcome: &FetchOutcome, limit: Option<usize>) -> Option<String> {
    let SessionSummary {
        username,
        pages,
        termination,
        ..
    } = &outcome.summary;
    let fetched = outcome.records.len();

    match termination {
        Termination::Exhausted => None,
        Termination::Cancelled if limit.is_some_and(|limit| fetched >= limit) => None,
        Termination::Cancelled => Some(format!(
            "Interrupted: fetched {} of {}'s starred repositories ({} full pages). \
             Re-run to fetch the rest.",
            fetched, username, pages
        )),
        Termination::Error(err) => Some(format!(
            "Stopped after {} of {}'s starred repositories ({} pages): {}",
            fetched,
            username,
            pages,
            starfetch::short_error_message(err)
        )),
    }
}

/// One row of the stars table.
#[derive(Debug, Clone, tabled::Tabled)]
struct StarDisplay {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Stars")]
    stars: u64,
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Repository> for StarDisplay {
    fn from(repo: &Repository) -> Self {
        Self {
            repository: repo.full_name.clone(),
            stars: repo.stargazers_count,
            language: repo.language.clone().unwrap_or_else(|| "-".to_string()),
            updated: repo
                .updated_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            description: repo
                .description
                .as_deref()
                .map(|d| truncate(d, DESCRIPTION_WIDTH))
                .unwrap_or_default(),
        }
    }
}

fn print_repositories(
    repos: &[Repository],
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Table => print_table(repos.iter().map(StarDisplay::from)),
        OutputFormat::Json => print_json(repos)?,
    }
    Ok(())
}
