use gitmine::HarvestProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: HarvestProgress) {
        match event {
            HarvestProgress::HarvestStarted { url } => {
                tracing::info!(url = %url, "Harvesting");
            }

            HarvestProgress::PageFetched {
                page,
                last_page,
                remaining,
            } => {
                tracing::debug!(page, last_page = ?last_page, remaining, "Fetched page");
            }

            HarvestProgress::RateLimitWait { wait, reset_at } => {
                tracing::info!(
                    wait_secs = wait.as_secs(),
                    reset_at,
                    "Rate limit exhausted, waiting for reset"
                );
            }

            HarvestProgress::HarvestComplete { pages, truncated } => {
                if truncated {
                    tracing::warn!(pages, "Harvest stopped at page cap");
                } else {
                    tracing::info!(pages, "Harvest complete");
                }
            }

            HarvestProgress::ResolvingCommits { total } => {
                tracing::info!(total, "Resolving last commits");
            }

            HarvestProgress::ResolvedCommit {
                index,
                total,
                name,
                resolved,
            } => {
                let repo = name.unwrap_or_default();
                if resolved {
                    tracing::debug!(repo = %repo, index, total, "Resolved last commit");
                } else {
                    tracing::info!(repo = %repo, index, total, "No last commit");
                }
            }

            HarvestProgress::CloningRepos { total } => {
                tracing::info!(total, "Cloning repositories");
            }

            HarvestProgress::ClonedRepo { name, error } => match error {
                Some(error) => tracing::warn!(repo = %name, error = %error, "Failed to clone"),
                None => tracing::debug!(repo = %name, "Cloned"),
            },

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
