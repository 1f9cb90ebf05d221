use std::sync::Arc;

use starfetch::GitHubClient;
use starfetch::github::{GitHubRateLimits, RateLimitResource};

use crate::commands::{OutputFormat, print_json, print_table};
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Handle the limits command.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = Arc::new(ProgressReporter::new());
    let client = GitHubClient::new(config.fetch.clone(), config.github_token())?
        .with_progress(reporter.as_callback());

    if !client.is_authenticated() {
        tracing::info!("No GitHub token configured; showing unauthenticated limits");
    }

    let rate_limits = client.get_rate_limits().await;
    reporter.finish();
    let items = rate_limits_to_display(&rate_limits?.resources);
    RateLimitDisplay::print_many(items, output)
}

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_resource(name: &str, resource: &RateLimitResource) -> Self {
        let usage = match resource.limit {
            0 => 0.0,
            limit => resource.used as f64 * 100.0 / limit as f64,
        };
        let reset_at = resource.reset_at();
        let until_reset = reset_at.signed_duration_since(chrono::Utc::now());

        Self {
            resource: name.to_string(),
            limit: resource.limit.to_string(),
            used: resource.used.to_string(),
            remaining: resource.remaining.to_string(),
            usage_percent: format!("{usage:.1}%"),
            reset_at: reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in: if until_reset.num_seconds() > 0 {
                format_duration(until_reset)
            } else {
                "now".to_string()
            },
        }
    }

    pub(crate) fn print_many(
        mut items: Vec<Self>,
        format: OutputFormat,
    ) -> Result<(), Box<dyn std::error::Error>> {
        items.sort_by(|a, b| a.resource.cmp(&b.resource));

        match format {
            OutputFormat::Table => print_table(items),
            OutputFormat::Json => print_json(&items)?,
        }
        Ok(())
    }
}

/// Build a vector of all reported rate limit resources for display.
pub(crate) fn rate_limits_to_display(limits: &GitHubRateLimits) -> Vec<RateLimitDisplay> {
    let mut items = vec![
        RateLimitDisplay::from_resource("core", &limits.core),
        RateLimitDisplay::from_resource("search", &limits.search),
    ];

    if let Some(ref r) = limits.graphql {
        items.push(RateLimitDisplay::from_resource("graphql", r));
    }
    if let Some(ref r) = limits.code_search {
        items.push(RateLimitDisplay::from_resource("code_search", r));
    }
    items
}

/// Render a positive duration with its two most significant units ("1h 5m", "2m 5s", "42s").
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (major, minor) = match secs {
        0..60 => ((secs, "s"), (0, "")),
        60..3600 => ((secs / 60, "m"), (secs % 60, "s")),
        _ => ((secs / 3600, "h"), ((secs % 3600) / 60, "m")),
    };
    match minor {
        (0, _) => format!("{}{}", major.0, major.1),
        (n, unit) => format!("{}{} {}{}", major.0, major.1, n, unit),
    }
}
