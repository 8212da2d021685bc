use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::{Term, style};
use gitmine::{
    CheckpointPolicy, DocumentStore, HarvestEnvelope, JsonFileStore, LastCommitResolver,
    ResolveError,
};

use crate::HarvestArgs;
use crate::commands::shared::{build_harvester, split_output};
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Flags of the `last-commit` command.
#[derive(Debug, Default)]
pub(crate) struct ResolveArgs {
    pub(crate) output: Option<PathBuf>,
    pub(crate) branch: Option<String>,
    pub(crate) checkpoint_every: Option<usize>,
}

/// Checkpoint path next to the input: `repos.json` -> `repos_last_commit.json`.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("repos");
    input.with_file_name(format!("{stem}_last_commit.json"))
}

fn checkpoint_policy(config: &Config, args: &ResolveArgs) -> CheckpointPolicy {
    match args.checkpoint_every {
        Some(0 | 1) => CheckpointPolicy::EveryItem,
        Some(n) => CheckpointPolicy::Every(n),
        None => config.resolve.checkpoint_policy(),
    }
}

pub(crate) async fn handle_last_commit(
    config: &Config,
    harvest: &HarvestArgs,
    input: &Path,
    args: ResolveArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(JsonFileStore::new());
    let envelope = HarvestEnvelope::from_document(store.read_document(input)?)
        .ok_or_else(|| format!("{} has no \"items\" member", input.display()))?;

    let output = args.output.clone().unwrap_or_else(|| default_output(input));
    let (dir, filename) = split_output(&output)?;
    let branch = args.branch.as_deref().unwrap_or(&config.resolve.branch);

    let resolver = LastCommitResolver::new(build_harvester(config, harvest)?, store, dir, filename)
        .with_branch(branch)
        .with_checkpoint_policy(checkpoint_policy(config, &args));

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let result = resolver.resolve_all(envelope, Some(&callback)).await;
    reporter.finish();

    let is_tty = Term::stdout().is_term();
    match result {
        Ok(report) => {
            if is_tty {
                println!(
                    "{} {} resolved, {} without a commit -> {}",
                    style("✓").green(),
                    report.resolved,
                    report.failed,
                    resolver.checkpoint_path().display()
                );
            } else {
                tracing::info!(
                    resolved = report.resolved,
                    failed = report.failed,
                    checkpoints = report.checkpoints,
                    path = %resolver.checkpoint_path().display(),
                    "Resolution finished"
                );
            }
            Ok(())
        }
        Err(ResolveError::Cancelled { processed }) => {
            if is_tty {
                eprintln!(
                    "{} Interrupted; the first {} repositories are saved in {}",
                    style("⚠").yellow(),
                    processed,
                    resolver.checkpoint_path().display()
                );
            }
            Err(ResolveError::Cancelled { processed }.into())
        }
        Err(error) => Err(error.into()),
    }
}
