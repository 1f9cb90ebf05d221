//! Configuration file support for starfetch.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `STARFETCH_`, nested keys joined
//!    with `__`, e.g. `STARFETCH_FETCH__PAGE_SIZE`)
//! 3. Config file (./starfetch.toml, then ~/.config/starfetch/config.toml)
//! 4. `GITHUB_TOKEN` / `GITHUB_USERNAME`, when nothing above set them
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use STARFETCH_GITHUB__TOKEN / GITHUB_TOKEN
//!
//! [fetch]
//! username = "octocat"
//! page_size = 100
//! max_retries = 3
//! retry_delay_ms = 1000
//! request_delay_ms = 100
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, ConfigBuilder as Builder, Environment, File, FileFormat};
use config::builder::DefaultState;
use directories::ProjectDirs;
use serde::Deserialize;
use starfetch::FetchConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub credentials.
    pub github: GitHubConfig,
    /// Fetch tuning, passed through to the library.
    pub fetch: FetchConfig,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via STARFETCH_GITHUB__TOKEN or GITHUB_TOKEN.
    pub token: Option<String>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/starfetch/config.toml)
    /// 3. Local config file (./starfetch.toml)
    /// 4. Environment variables with STARFETCH_ prefix
    ///
    /// `GITHUB_TOKEN` and `GITHUB_USERNAME` fill whatever is still unset.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("starfetch.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./starfetch.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., STARFETCH_FETCH__PAGE_SIZE -> fetch.page_size
        builder = builder.add_source(
            Environment::with_prefix("STARFETCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config = Self::from_builder(builder);
        config.apply_fallbacks(|key| std::env::var(key).ok());
        config
    }

    fn from_builder(builder: Builder<DefaultState>) -> Self {
        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Fill the token and username from the conventional GitHub variables.
    fn apply_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.github.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            self.github.token = lookup("GITHUB_TOKEN").filter(|t| !t.trim().is_empty());
        }
        if self.fetch.username.trim().is_empty()
            && let Some(username) = lookup("GITHUB_USERNAME")
        {
            self.fetch.username = username.trim().to_string();
        }
    }

    /// Get the GitHub token.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Resolve whose stars to fetch: the explicit argument wins over config.
    pub fn username(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| Some(self.fetch.username.trim()).filter(|u| !u.is_empty()))
            .map(str::to_string)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "starfetch").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
