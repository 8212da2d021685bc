use std::path::Path;
use std::sync::Arc;

use console::{Term, style};
use gitmine::{
    BatchHarvester, BatchReport, DocumentStore, EndpointShape, JsonFileStore, ResourceKind,
    read_repo_list,
};

use crate::HarvestArgs;
use crate::commands::shared::{build_harvester, split_output};
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Harvest one endpoint into `output`.
pub(crate) async fn handle_fetch(
    config: &Config,
    args: &HarvestArgs,
    endpoint: &str,
    shape: EndpointShape,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let harvester = build_harvester(config, args)?;
    let url = config.endpoint_url(endpoint);
    let (dir, filename) = split_output(output)?;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let result = harvester.harvest(&url, shape, Some(&callback)).await;
    reporter.finish();
    let harvest = result?;

    let path = JsonFileStore::new().write_document(&harvest.envelope.to_document(), &dir, &filename)?;

    if Term::stdout().is_term() {
        println!(
            "{} {} pages, {} items -> {}",
            style("✓").green(),
            harvest.pages_fetched(),
            harvest.envelope.len(),
            path.display()
        );
        if harvest.truncated() {
            println!(
                "{} Stopped at the page cap; more pages exist",
                style("⚠").yellow()
            );
        }
    } else {
        tracing::info!(
            pages = harvest.pages_fetched(),
            items = harvest.envelope.len(),
            truncated = harvest.truncated(),
            path = %path.display(),
            "Saved harvest"
        );
    }

    Ok(())
}

/// Run a batch workflow over a repository list.
///
/// `kind` selects the sub-resource; `None` runs the repository/tags workflow.
pub(crate) async fn handle_batch(
    config: &Config,
    args: &HarvestArgs,
    list: &Path,
    kind: Option<ResourceKind>,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo_urls = read_repo_list(list)?;
    if repo_urls.is_empty() {
        return Err(format!("{} lists no repositories", list.display()).into());
    }

    let harvester = build_harvester(config, args)?;
    let batch = BatchHarvester::new(harvester, Arc::new(JsonFileStore::new()), out_dir);

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let report = match kind {
        Some(kind) => {
            batch
                .harvest_resource(&repo_urls, kind, Some(&callback))
                .await
        }
        None => batch.harvest_repo_tags(&repo_urls, Some(&callback)).await,
    };
    reporter.finish();

    display_batch_report(&report, repo_urls.len(), Term::stdout().is_term());

    if report.cancelled {
        return Err("batch interrupted".into());
    }
    if !report.failed.is_empty() {
        return Err(format!(
            "{} of {} repositories failed",
            report.failed.len(),
            report.total()
        )
        .into());
    }

    Ok(())
}

fn display_batch_report(report: &BatchReport, listed: usize, is_tty: bool) {
    if is_tty {
        println!();
        for entry in &report.succeeded {
            println!("{} {}", style("✓").green(), entry.url);
            for output in &entry.outputs {
                println!("    {}", output.display());
            }
        }
        for failure in &report.failed {
            eprintln!("{} {}: {}", style("✗").red(), failure.url, failure.error);
        }
        if report.cancelled {
            eprintln!(
                "{} Interrupted after {} of {} repositories",
                style("⚠").yellow(),
                report.total(),
                listed
            );
        }
    } else {
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            listed,
            cancelled = report.cancelled,
            "Batch finished"
        );
    }
}
