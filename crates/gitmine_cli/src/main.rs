//! Gitmine CLI - harvest GitHub metadata and filter it offline.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use gitmine::filter::DEFAULT_BUG_LABEL;
use gitmine::{EndpointShape, ResourceKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gitmine")]
#[command(version)]
#[command(about = "Rate-limit aware GitHub metadata harvester")]
#[command(
    long_about = "Gitmine follows GitHub's Link-header pagination, waits out exhausted \
rate-limit windows, and stores every harvest as a flat {\"items\": [...]} JSON document. \
The filter commands derive smaller views of those documents offline."
)]
#[command(after_long_help = r#"EXAMPLES
    Harvest every page of a repository's commits:
        $ gitmine fetch repos/spring-projects/spring-boot/commits -o spring-boot_commits.json

    Harvest issues for a list of repositories:
        $ gitmine batch repos.txt --kind issues -o data/

    Attach the last master commit to each repository of a search result:
        $ gitmine last-commit java_repos.json

    Keep only commits made during 2019:
        $ gitmine commits-window spring-boot_commits.json \
            --after 2019-01-01T00:00:00 --before 2020-01-01T00:00:00 -o commits_2019.json

    Write the titles of bug issues, one per line:
        $ gitmine bug-titles cpython_issues.json -o cpython_bugs.txt

CONFIGURATION
    Gitmine reads configuration from:
      1. ~/.config/gitmine/config.toml (or $XDG_CONFIG_HOME/gitmine/config.toml)
      2. ./gitmine.toml
      3. Environment variables (GITMINE_* prefix, e.g., GITMINE_HARVEST__MAX_PAGES)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITMINE_GITHUB_TOKEN          GitHub personal access token
    GITMINE_GITHUB__API_URL       API base for relative endpoints (default: https://api.github.com)
    GITMINE_HARVEST__MAX_PAGES    Page cap per endpoint (default: unbounded)
    GITMINE_CLONE__USERNAME       Username for HTTPS cloning
    GITMINE_CLONE__PASSWORD       Password or token for HTTPS cloning
"#)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Harvest one endpoint into a JSON document
    Fetch {
        /// Endpoint URL, or a path relative to the API base (e.g. repos/o/r/tags)
        endpoint: String,

        /// How responses merge: single, records or pages
        #[arg(short, long, default_value = "pages")]
        shape: EndpointShape,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Harvest tags, issues or commits for every repository in a list
    Batch {
        /// Text file with one repository API URL per line
        list: PathBuf,

        /// Sub-resource to harvest: tags, issues or commits
        #[arg(short, long)]
        kind: ResourceKind,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Save each listed repository, its tags_url and its tags
    RepoTags {
        /// Text file with one repository API URL per line
        list: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Attach the last commit of a branch to each harvested repository
    LastCommit {
        /// Harvested repository list ({"items": [...]})
        input: PathBuf,

        /// Checkpoint file (default: <input>_last_commit.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Branch to resolve (default from config or "master")
        #[arg(short, long)]
        branch: Option<String>,

        /// Write the checkpoint after this many repositories
        #[arg(long)]
        checkpoint_every: Option<usize>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },
    /// Keep only the named fields of each record
    Project {
        /// Harvested document
        input: PathBuf,

        /// Comma-separated field names
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Keep commits whose committer date lies strictly inside a window
    CommitsWindow {
        /// Harvested commits document
        input: PathBuf,

        /// Exclusive lower bound (RFC 3339, or naive UTC like 2019-01-01T00:00:00)
        #[arg(long)]
        after: String,

        /// Exclusive upper bound
        #[arg(long)]
        before: String,

        /// Sort the result by committer date instead of traversal order
        #[arg(long)]
        chronological: bool,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the titles of issues carrying a label, one per line
    BugTitles {
        /// Harvested issues document
        input: PathBuf,

        /// Label name to match
        #[arg(short, long, default_value = DEFAULT_BUG_LABEL)]
        label: String,

        /// Output text file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Clone every harvested repository with git
    Clone {
        /// Harvested repository list ({"items": [...]})
        input: PathBuf,

        /// Directory to clone into
        #[arg(short = 'd', long, default_value = ".")]
        target_dir: PathBuf,

        /// Shallow clone depth
        #[arg(long)]
        depth: Option<u32>,

        /// Clone anonymously even if credentials are configured
        #[arg(long)]
        anonymous: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Harvest options shared by every command that talks to the API.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct HarvestArgs {
    /// Stop after this many pages per endpoint (default from config or unbounded)
    #[arg(short = 'm', long)]
    pub(crate) max_pages: Option<u32>,

    /// Proactive request pacing (default from config or off)
    #[arg(short = 'r', long)]
    pub(crate) requests_per_second: Option<u32>,

    /// GitHub token (overrides config and GITMINE_GITHUB_TOKEN)
    #[arg(long)]
    pub(crate) token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging only when stdout is not a TTY; progress bars otherwise
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("gitmine=info,gitmine_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            endpoint,
            shape,
            output,
            harvest,
        } => {
            commands::harvest::handle_fetch(&config, &harvest, &endpoint, shape, &output).await?;
        }
        Commands::Batch {
            list,
            kind,
            output,
            harvest,
        } => {
            commands::harvest::handle_batch(&config, &harvest, &list, Some(kind), &output).await?;
        }
        Commands::RepoTags {
            list,
            output,
            harvest,
        } => {
            commands::harvest::handle_batch(&config, &harvest, &list, None, &output).await?;
        }
        Commands::LastCommit {
            input,
            output,
            branch,
            checkpoint_every,
            harvest,
        } => {
            let options = commands::resolve::ResolveArgs {
                output,
                branch,
                checkpoint_every,
            };
            commands::resolve::handle_last_commit(&config, &harvest, &input, options).await?;
        }
        Commands::Project {
            input,
            fields,
            output,
        } => {
            commands::filter::handle_project(&input, &fields, &output)?;
        }
        Commands::CommitsWindow {
            input,
            after,
            before,
            chronological,
            output,
        } => {
            commands::filter::handle_commits_window(&input, &after, &before, chronological, &output)?;
        }
        Commands::BugTitles {
            input,
            label,
            output,
        } => {
            commands::filter::handle_bug_titles(&input, &label, &output)?;
        }
        Commands::Clone {
            input,
            target_dir,
            depth,
            anonymous,
        } => {
            let credentials = if anonymous {
                None
            } else {
                config.clone.credentials()
            };
            commands::clone::handle_clone(&input, &target_dir, depth, credentials).await?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
    }

    Ok(())
}
