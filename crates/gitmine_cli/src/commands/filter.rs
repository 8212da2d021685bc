use std::path::{Path, PathBuf};

use console::{Term, style};
use gitmine::filter::{extract_titles_file, filter_commits_file, project_file};
use gitmine::{CommitOrder, FilterOutcome, JsonFileStore, TimeWindow};

use crate::commands::shared::{display_skipped, split_output};

pub(crate) fn handle_project(
    input: &Path,
    fields: &[String],
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let (dir, filename) = split_output(output)?;
    let outcome = project_file(&JsonFileStore, input, fields, &dir, &filename)?;
    report_outcome(&outcome, "Projected");
    Ok(())
}

pub(crate) fn handle_commits_window(
    input: &Path,
    after: &str,
    before: &str,
    chronological: bool,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let window = TimeWindow::parse(after, before)?;
    let order = if chronological {
        CommitOrder::Chronological
    } else {
        CommitOrder::Traversal
    };

    let (dir, filename) = split_output(output)?;
    let outcome = filter_commits_file(&JsonFileStore, input, &window, order, &dir, &filename)?;
    report_outcome(&outcome, "Filtered commits");
    Ok(())
}

pub(crate) fn handle_bug_titles(
    input: &Path,
    label: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = extract_titles_file(&JsonFileStore, input, label, output)?;
    report_outcome(&outcome, "Extracted titles");
    Ok(())
}

fn report_outcome(outcome: &FilterOutcome<PathBuf>, action: &str) {
    let is_tty = Term::stdout().is_term();
    if is_tty {
        println!(
            "{} {} -> {}",
            style("✓").green(),
            action,
            outcome.value.display()
        );
    } else {
        tracing::info!(
            path = %outcome.value.display(),
            skipped = outcome.skipped_count(),
            "{action}"
        );
    }
    display_skipped(&outcome.skipped, is_tty);
}
