use std::path::Path;
use std::sync::Arc;

use console::{Term, style};
use gitmine::{
    CloneReport, Credentials, DocumentStore, GitCliCloner, HarvestEnvelope, JsonFileStore,
    clone_all,
};

use crate::progress::ProgressReporter;
use crate::shutdown::shutdown_flag;

pub(crate) async fn handle_clone(
    input: &Path,
    target_dir: &Path,
    depth: Option<u32>,
    credentials: Option<Credentials>,
) -> Result<(), Box<dyn std::error::Error>> {
    let envelope = HarvestEnvelope::from_document(JsonFileStore.read_document(input)?)
        .ok_or_else(|| format!("{} has no \"items\" member", input.display()))?;

    std::fs::create_dir_all(target_dir)?;

    let cloner = GitCliCloner::new().with_depth(depth);
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let report = clone_all(
        &cloner,
        &envelope,
        target_dir,
        credentials.as_ref(),
        Some(shutdown_flag()),
        Some(&callback),
    )
    .await;
    reporter.finish();

    display_clone_report(&report, Term::stdout().is_term());

    if report.cancelled {
        return Err("cloning interrupted".into());
    }
    if !report.failed.is_empty() {
        return Err(format!("{} repositories failed to clone", report.failed.len()).into());
    }
    Ok(())
}

fn display_clone_report(report: &CloneReport, is_tty: bool) {
    if is_tty {
        println!(
            "{} Cloned {} repositories",
            style("✓").green(),
            report.cloned.len()
        );
        for (name, error) in &report.failed {
            eprintln!("{} {}: {}", style("✗").red(), name, error);
        }
    } else {
        tracing::info!(
            cloned = report.cloned.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Cloning finished"
        );
    }
}
