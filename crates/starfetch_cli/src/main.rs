//! Starfetch CLI - list every repository a GitHub user has starred.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;
use crate::commands::stars::StarsOptions;

#[derive(Parser)]
#[command(name = "starfetch")]
#[command(version)]
#[command(about = "Fetch the repositories a GitHub user has starred")]
#[command(
    long_about = "Starfetch pages through a GitHub user's starred repositories, \
waiting out rate limits and retrying transient failures, and prints the \
records as a table or as JSON."
)]
#[command(after_long_help = r#"EXAMPLES
    List your starred repositories:
        $ starfetch stars octocat

    Export them as JSON:
        $ starfetch stars octocat --format json > stars.json

    Only the 20 most recently updated:
        $ starfetch stars octocat --limit 20

    Check the remaining API quota:
        $ starfetch limits

    Show one repository and its README:
        $ starfetch repo rust-lang/rust --readme

    Generate shell completions:
        $ starfetch completions bash > ~/.local/share/bash-completion/completions/starfetch

CONFIGURATION
    Starfetch reads configuration from:
      1. ~/.config/starfetch/config.toml (or $XDG_CONFIG_HOME/starfetch/config.toml)
      2. ./starfetch.toml
      3. Environment variables (STARFETCH_* prefix, "__" between sections and keys)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    STARFETCH_GITHUB__TOKEN           GitHub personal access token
    STARFETCH_FETCH__USERNAME         Default user whose stars are fetched
    STARFETCH_FETCH__PAGE_SIZE        Results per page (1-100, default: 100)
    STARFETCH_FETCH__MAX_RETRIES      Retries for transient failures (default: 3)
    STARFETCH_FETCH__REQUEST_DELAY_MS Pause between pages (default: 100)
    GITHUB_TOKEN                      Used when no token is configured
    GITHUB_USERNAME                   Used when no username is configured
    RUST_LOG                          Log filter for non-interactive output
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a user's starred repositories
    Stars {
        #[command(flatten)]
        opts: StarsOptions,
    },
    /// Show current rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show a single repository
    Repo {
        /// Repository as OWNER/NAME
        repository: String,

        /// Also print the README
        #[arg(long)]
        readme: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    // Only initialize if not connected to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("starfetch=info,starfetch_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
        }
        Commands::Stars { opts } => {
            let config = config::Config::load();
            shutdown::setup_shutdown_handler();
            commands::stars::handle_stars(opts, &config).await?;
        }
        Commands::Limits { output } => {
            let config = config::Config::load();
            commands::limits::handle_limits(output, &config).await?;
        }
        Commands::Repo {
            repository,
            readme,
            output,
        } => {
            let config = config::Config::load();
            commands::repo::handle_repo(&repository, readme, output, &config).await?;
        }
    }

    Ok(())
}
