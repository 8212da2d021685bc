//! Batch harvesting driven by a text file of repository API URLs.
//!
//! Each non-empty line is a repository URL such as
//! `https://api.github.com/repos/spring-projects/spring-boot`. Output files
//! are named after the last path segment (`spring-boot_commits.json`).
//! Failures are collected per line; one bad repository never stops the
//! batch. Only cancellation does.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::filter::{self, FilterError};
use crate::harvest::{EndpointShape, HarvestError, PaginatedHarvester};
use crate::progress::ProgressCallback;
use crate::storage::{DocumentStore, StorageError};

/// Sub-resource harvested for every repository of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Tags,
    Issues,
    Commits,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Tags, ResourceKind::Issues, ResourceKind::Commits];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Tags => "tags",
            ResourceKind::Issues => "issues",
            ResourceKind::Commits => "commits",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown resource '{s}' (expected tags, issues or commits)"))
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot read repository list {}: {source}", path.display())]
    ReadList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid repository URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("repository document has no string tags_url")]
    MissingTagsUrl,
}

/// A repository processed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub url: String,
    pub outputs: Vec<PathBuf>,
}

/// A repository that failed.
#[derive(Debug)]
pub struct BatchFailure {
    pub url: String,
    pub error: BatchError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<BatchEntry>,
    pub failed: Vec<BatchFailure>,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Read a repository list: one URL per line, blank lines and `#` comments ignored.
pub fn read_repo_list(path: &Path) -> Result<Vec<String>, BatchError> {
    let text = fs::read_to_string(path).map_err(|source| BatchError::ReadList {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Last non-empty path segment of a repository URL.
pub fn repo_name(repo_url: &str) -> Result<String, BatchError> {
    let invalid = |reason: &str| BatchError::InvalidUrl {
        url: repo_url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(repo_url).map_err(|e| invalid(&e.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)
        .ok_or_else(|| invalid("URL has no path"))
}

fn sub_resource_url(repo_url: &str, kind: ResourceKind) -> String {
    format!("{}/{}", repo_url.trim_end_matches('/'), kind.as_str())
}

/// Runs harvest workflows over a repository list.
pub struct BatchHarvester {
    harvester: PaginatedHarvester,
    store: Arc<dyn DocumentStore>,
    out_dir: PathBuf,
}

impl BatchHarvester {
    pub fn new(
        harvester: PaginatedHarvester,
        store: Arc<dyn DocumentStore>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            harvester,
            store,
            out_dir: out_dir.into(),
        }
    }

    /// Harvest `<repo>/<kind>` page-of-pages into `<name>_<kind>.json` for every URL.
    pub async fn harvest_resource(
        &self,
        repo_urls: &[String],
        kind: ResourceKind,
        on_progress: Option<&ProgressCallback>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for repo_url in repo_urls {
            let outcome = self.resource(repo_url, kind, on_progress).await;
            if self.record(&mut report, repo_url, outcome) {
                break;
            }
        }

        self.log_report(&report, kind.as_str());
        report
    }

    /// For every URL: save the raw repository, its projected `tags_url`, and its tags.
    pub async fn harvest_repo_tags(
        &self,
        repo_urls: &[String],
        on_progress: Option<&ProgressCallback>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for repo_url in repo_urls {
            let outcome = self.repo_tags(repo_url, on_progress).await;
            if self.record(&mut report, repo_url, outcome) {
                break;
            }
        }

        self.log_report(&report, "repo-tags");
        report
    }

    async fn resource(
        &self,
        repo_url: &str,
        kind: ResourceKind,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<PathBuf>, BatchError> {
        let name = repo_name(repo_url)?;
        let url = sub_resource_url(repo_url, kind);
        tracing::info!(repo = %name, url = %url, "Harvesting {kind}");

        let harvest = self
            .harvester
            .harvest(&url, EndpointShape::CollectionOfPages, on_progress)
            .await?;
        let path = self.store.write_document(
            &harvest.envelope.into_document(),
            &self.out_dir,
            &format!("{name}_{kind}.json"),
        )?;

        Ok(vec![path])
    }

    async fn repo_tags(
        &self,
        repo_url: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<PathBuf>, BatchError> {
        let name = repo_name(repo_url)?;
        tracing::info!(repo = %name, url = %repo_url, "Harvesting repository and tags");

        let raw = self
            .harvester
            .harvest(repo_url, EndpointShape::SingleResource, on_progress)
            .await?;
        let raw_path = self.store.write_document(
            &raw.envelope.into_document(),
            &self.out_dir,
            &format!("{name}_raw.json"),
        )?;

        let projected = filter::project_file(
            self.store.as_ref(),
            &raw_path,
            &["tags_url"],
            &self.out_dir,
            &format!("{name}_tagsURL.json"),
        )?;

        let tags_url = self
            .store
            .read_document(&projected.value)?
            .pointer("/items/0/tags_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(BatchError::MissingTagsUrl)?;

        let tags = self
            .harvester
            .harvest(&tags_url, EndpointShape::CollectionOfPages, on_progress)
            .await?;
        let tags_path = self.store.write_document(
            &tags.envelope.into_document(),
            &self.out_dir,
            &format!("{name}_tags.json"),
        )?;

        Ok(vec![raw_path, projected.value, tags_path])
    }

    /// Record one outcome; returns true when the batch must stop.
    fn record(
        &self,
        report: &mut BatchReport,
        repo_url: &str,
        outcome: Result<Vec<PathBuf>, BatchError>,
    ) -> bool {
        match outcome {
            Ok(outputs) => {
                report.succeeded.push(BatchEntry {
                    url: repo_url.to_string(),
                    outputs,
                });
                false
            }
            Err(BatchError::Harvest(HarvestError::Cancelled)) => {
                tracing::warn!(url = %repo_url, "Batch cancelled");
                report.cancelled = true;
                true
            }
            Err(error) => {
                tracing::warn!(url = %repo_url, %error, "Repository failed");
                report.failed.push(BatchFailure {
                    url: repo_url.to_string(),
                    error,
                });
                false
            }
        }
    }

    fn log_report(&self, report: &BatchReport, workflow: &str) {
        tracing::info!(
            workflow,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            out_dir = %self.out_dir.display(),
            "Batch finished"
        );
    }
}
