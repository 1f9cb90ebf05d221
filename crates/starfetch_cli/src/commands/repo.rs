use std::sync::Arc;

use starfetch::{GitHubClient, Repository};

use crate::commands::{OutputFormat, print_json, print_table};
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Handle the repo command.
pub(crate) async fn handle_repo(
    slug: &str,
    readme: bool,
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (owner, name) = parse_slug(slug)?;

    let reporter = Arc::new(ProgressReporter::new());
    let client = GitHubClient::new(config.fetch.clone(), config.github_token())?
        .with_progress(reporter.as_callback());

    let repo = client.get_repository(owner, name).await;
    let readme = match (&repo, readme) {
        (Ok(_), true) => Some(client.get_readme(owner, name, None).await),
        _ => None,
    };
    reporter.finish();
    let repo = repo?;

    match output {
        OutputFormat::Table => print_table(repository_fields(&repo)),
        OutputFormat::Json => print_json(&repo)?,
    }

    if let Some(readme) = readme {
        match readme? {
            Some(text) => println!("\n{}", text),
            None => eprintln!("{} has no README", repo.full_name),
        }
    }
    Ok(())
}

/// Split `owner/name`.
fn parse_slug(slug: &str) -> Result<(&str, &str), String> {
    match slug.trim().split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner, name))
        }
        _ => Err(format!("Expected OWNER/NAME, got '{}'", slug)),
    }
}

/// One row of the repository detail table.
#[derive(Debug, Clone, tabled::Tabled)]
struct FieldDisplay {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn repository_fields(repo: &Repository) -> Vec<FieldDisplay> {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    let date = |value: Option<chrono::DateTime<chrono::Utc>>| {
        or_dash(value.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string()))
    };

    let mut flags = Vec::new();
    for (set, label) in [
        (repo.archived, "archived"),
        (repo.disabled, "disabled"),
        (repo.private, "private"),
        (repo.fork, "fork"),
    ] {
        if set {
            flags.push(label);
        }
    }

    let rows = [
        ("Repository", repo.full_name.clone()),
        ("URL", repo.html_url.clone()),
        ("Description", or_dash(repo.description.clone())),
        ("Homepage", or_dash(repo.homepage.clone())),
        ("Language", or_dash(repo.language.clone())),
        (
            "License",
            or_dash(repo.license.as_ref().and_then(|l| {
                l.spdx_id()
                    .or_else(|| l.name())
                    .map(str::to_string)
            })),
        ),
        ("Stars", repo.stargazers_count.to_string()),
        ("Forks", repo.forks_count.to_string()),
        ("Watchers", repo.subscribers_count.to_string()),
        ("Open issues", repo.open_issues_count.to_string()),
        (
            "Topics",
            or_dash(
                Some(repo.topics.iter().cloned().collect::<Vec<_>>().join(", "))
                    .filter(|t| !t.is_empty()),
            ),
        ),
        ("Default branch", repo.default_branch.clone()),
        ("Created", date(repo.created_at)),
        ("Updated", date(repo.updated_at)),
        ("Pushed", date(repo.pushed_at)),
        (
            "Flags",
            or_dash(Some(flags.join(", ")).filter(|f| !f.is_empty())),
        ),
    ];

    rows.into_iter()
        .map(|(field, value)| FieldDisplay { field, value })
        .collect()
}
