//! Configuration file support for gitmine.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. `GITMINE_GITHUB_TOKEN`
//! 3. Environment variables (prefixed with `GITMINE_`, sections separated by
//!    a double underscore, e.g. `GITMINE_HARVEST__MAX_PAGES`)
//! 4. Config file (./gitmine.toml, then ~/.config/gitmine/config.toml)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use GITMINE_GITHUB_TOKEN env var
//! api_url = "https://api.github.com"
//!
//! [harvest]
//! max_pages = 50          # unset means follow every page
//! timeout_secs = 30
//! safety_margin_secs = 1
//! requests_per_second = 5 # unset disables client-side pacing
//!
//! [resolve]
//! branch = "master"
//! checkpoint_every = 1
//!
//! [clone]
//! username = "octocat"
//! password = "..."        # a personal access token works here
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use gitmine::harvest::DEFAULT_USER_AGENT;
use gitmine::last_commit::DEFAULT_BRANCH;
use gitmine::{CheckpointPolicy, Credentials};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub harvest: HarvestConfig,
    pub resolve: ResolveConfig,
    pub clone: CloneConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via GITMINE_GITHUB_TOKEN environment variable.
    pub token: Option<String>,
    /// Base URL for relative endpoint paths.
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Harvest loop settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Stop after this many pages per endpoint.
    pub max_pages: Option<u32>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Extra wait after a rate-limit reset.
    pub safety_margin_secs: u64,
    /// Client-side request pacing.
    pub requests_per_second: Option<u32>,
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            timeout_secs: 30,
            safety_margin_secs: 1,
            requests_per_second: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HarvestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}

/// Last-commit resolution settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub branch: String,
    /// Write the checkpoint after this many repositories.
    pub checkpoint_every: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            checkpoint_every: 1,
        }
    }
}

impl ResolveConfig {
    pub fn checkpoint_policy(&self) -> CheckpointPolicy {
        match self.checkpoint_every {
            0 | 1 => CheckpointPolicy::EveryItem,
            n => CheckpointPolicy::Every(n),
        }
    }
}

/// Credentials for HTTPS cloning.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CloneConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for CloneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloneConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CloneConfig {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gitmine/config.toml)
    /// 3. Local config file (./gitmine.toml)
    /// 4. Environment variables with GITMINE_ prefix
    /// 5. GITMINE_GITHUB_TOKEN
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

        let local_config = PathBuf::from("gitmine.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitmine.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., GITMINE_HARVEST__MAX_PAGES -> harvest.max_pages
        builder = builder.add_source(
            Environment::with_prefix("GITMINE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let token = std::env::var("GITMINE_GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        builder = match builder.set_override_option("github.token", token) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!("Failed to apply GITMINE_GITHUB_TOKEN: {}", e);
                return Config::default();
            }
        };

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

    /// Get the GitHub token.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone().filter(|t| !t.is_empty())
    }

    /// Resolve an endpoint argument: absolute URLs pass through, paths are
    /// joined onto the configured API base.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.github.api_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitmine").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
