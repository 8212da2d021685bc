//! Progress reporting types for harvesting and resolution runs.
//!
//! Events are purely observational: nothing in the library changes
//! behaviour based on whether a callback is installed.

use std::time::Duration;

/// Progress events emitted by long-running operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HarvestProgress {
    /// Starting a paginated harvest.
    HarvestStarted {
        /// The first URL requested.
        url: String,
    },

    /// A page was fetched and merged.
    PageFetched {
        /// Page number (1-indexed, counted within this harvest).
        page: u32,
        /// Last page number from the Link header, if known.
        last_page: Option<u32>,
        /// Requests left in the current rate-limit window.
        remaining: u64,
    },

    /// The quota is spent and the harvest is sleeping until reset.
    RateLimitWait {
        /// How long the harvest will sleep.
        wait: Duration,
        /// Epoch seconds of the reset instant.
        reset_at: i64,
    },

    /// A harvest finished.
    HarvestComplete {
        /// Number of pages merged.
        pages: u32,
        /// Whether the page cap stopped the harvest early.
        truncated: bool,
    },

    /// Starting to resolve last commits for a list of repositories.
    ResolvingCommits {
        /// Number of repository descriptors.
        total: usize,
    },

    /// One repository descriptor was processed.
    ResolvedCommit {
        /// 1-indexed position in the list.
        index: usize,
        /// Total number of descriptors.
        total: usize,
        /// Repository name, when the descriptor has one.
        name: Option<String>,
        /// Whether a commit was attached.
        resolved: bool,
    },

    /// Starting to clone repositories.
    CloningRepos {
        /// Number of repositories to clone.
        total: usize,
    },

    /// One repository clone attempt finished.
    ClonedRepo {
        /// Repository name.
        name: String,
        /// Error message if the clone failed.
        error: Option<String>,
    },
}

/// Callback for progress updates.
pub type ProgressCallback = Box<dyn Fn(HarvestProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: HarvestProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
