//! Attach the latest commit of a branch to each repository descriptor.
//!
//! Descriptors carry a `commits_url` template such as
//! `https://api.github.com/repos/o/r/commits{/sha}`. The placeholder is
//! replaced with the branch, the commit is fetched as a single resource and
//! its `sha` and `html_url` are stored under `last_commit`. The whole
//! collection is checkpointed to storage as it goes, so an interrupted run
//! leaves every processed repository on disk.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::harvest::{EndpointShape, HarvestEnvelope, HarvestError, PaginatedHarvester, json_type};
use crate::progress::{HarvestProgress, ProgressCallback, emit};
use crate::storage::{DocumentStore, StorageError};

pub const DEFAULT_BRANCH: &str = "master";
pub const SHA_PLACEHOLDER: &str = "{/sha}";

/// When the collection is written back to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// After every repository.
    #[default]
    EveryItem,
    /// After every `n` repositories (0 acts as 1), plus once at the end.
    Every(usize),
}

impl CheckpointPolicy {
    fn is_due(self, processed: usize) -> bool {
        match self {
            CheckpointPolicy::EveryItem => true,
            CheckpointPolicy::Every(n) => processed % n.max(1) == 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Writing a checkpoint failed; the run stops so storage never lags
    /// silently behind.
    #[error("checkpoint write failed after {processed} repositories: {source}")]
    Checkpoint {
        processed: usize,
        #[source]
        source: StorageError,
    },

    #[error("resolution cancelled after {processed} repositories")]
    Cancelled { processed: usize },

    #[error("expected an array of repository descriptors, found {found}")]
    NotACollection { found: &'static str },
}

/// Why one repository got no commit.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("descriptor has no string commits_url")]
    MissingCommitsUrl,

    #[error("commits_url {0:?} has no {SHA_PLACEHOLDER} placeholder")]
    NoPlaceholder(String),

    #[error(transparent)]
    Harvest(#[from] HarvestError),
}

/// Outcome of a resolution run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveReport {
    pub envelope: HarvestEnvelope,
    /// Descriptors that received a commit `sha`.
    pub resolved: usize,
    /// Descriptors that ended with an empty or partial `last_commit`.
    pub failed: usize,
    pub checkpoints: usize,
}

/// Resolves and checkpoints `last_commit` for a repository list.
pub struct LastCommitResolver {
    harvester: PaginatedHarvester,
    store: Arc<dyn DocumentStore>,
    dir: PathBuf,
    filename: String,
    branch_segment: String,
    policy: CheckpointPolicy,
}

impl LastCommitResolver {
    /// Checkpoints go to `dir/filename`.
    pub fn new(
        harvester: PaginatedHarvester,
        store: Arc<dyn DocumentStore>,
        dir: impl Into<PathBuf>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            harvester,
            store,
            dir: dir.into(),
            filename: filename.into(),
            branch_segment: format!("/{DEFAULT_BRANCH}"),
            policy: CheckpointPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch_segment = if branch.starts_with('/') {
            branch.to_string()
        } else {
            format!("/{branch}")
        };
        self
    }

    #[must_use]
    pub fn with_checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    /// Resolved commit URL for a `commits_url` template.
    pub fn commit_url(&self, commits_url: &str) -> Option<String> {
        commits_url
            .contains(SHA_PLACEHOLDER)
            .then(|| commits_url.replace(SHA_PLACEHOLDER, &self.branch_segment))
    }

    /// Resolve every descriptor of `envelope`.
    ///
    /// Per-repository failures are logged and leave `last_commit` empty;
    /// only checkpoint failures and cancellation stop the run.
    pub async fn resolve_all(
        &self,
        mut envelope: HarvestEnvelope,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<ResolveReport, ResolveError> {
        let total = match &envelope.items {
            Value::Array(items) => items.len(),
            other => {
                return Err(ResolveError::NotACollection {
                    found: json_type(other),
                });
            }
        };

        emit(on_progress, HarvestProgress::ResolvingCommits { total });
        tracing::info!(total, branch = %self.branch_segment, "Resolving last commits");

        let mut report = ResolveReport {
            envelope: HarvestEnvelope::new(),
            resolved: 0,
            failed: 0,
            checkpoints: 0,
        };
        let mut written_through = 0;

        for index in 0..total {
            if self.harvester.is_cancelled() {
                return Err(self.stop_cancelled(&envelope, index, written_through, &mut report));
            }

            let Some(item) = envelope.items.get_mut(index) else {
                break;
            };
            if !item.is_object() {
                tracing::warn!(index, found = json_type(item), "Skipping non-object repository entry");
                continue;
            }
            let Some(descriptor) = item.as_object_mut() else {
                continue;
            };

            let name = descriptor_name(descriptor);
            let last_commit = match self.lookup(descriptor).await {
                Ok(commit) => commit,
                Err(LookupError::Harvest(HarvestError::Cancelled)) => {
                    return Err(self.stop_cancelled(&envelope, index, written_through, &mut report));
                }
                Err(error) => {
                    tracing::warn!(
                        index,
                        repo = name.as_deref().unwrap_or("<unnamed>"),
                        %error,
                        "Could not resolve last commit"
                    );
                    Map::new()
                }
            };

            let resolved = last_commit.contains_key("sha");
            if resolved {
                report.resolved += 1;
            } else {
                report.failed += 1;
            }
            descriptor.insert("last_commit".to_string(), Value::Object(last_commit));

            let processed = index + 1;
            if self.policy.is_due(processed) {
                self.checkpoint(&envelope, processed)?;
                report.checkpoints += 1;
                written_through = processed;
            }

            emit(
                on_progress,
                HarvestProgress::ResolvedCommit {
                    index: processed,
                    total,
                    name,
                    resolved,
                },
            );
        }

        if written_through < total || total == 0 {
            self.checkpoint(&envelope, total)?;
            report.checkpoints += 1;
        }

        tracing::info!(
            resolved = report.resolved,
            failed = report.failed,
            path = %self.checkpoint_path().display(),
            "Last commits resolved"
        );

        report.envelope = envelope;
        Ok(report)
    }

    async fn lookup(&self, descriptor: &Map<String, Value>) -> Result<Map<String, Value>, LookupError> {
        let commits_url = descriptor
            .get("commits_url")
            .and_then(Value::as_str)
            .ok_or(LookupError::MissingCommitsUrl)?;
        let url = self
            .commit_url(commits_url)
            .ok_or_else(|| LookupError::NoPlaceholder(commits_url.to_string()))?;

        let harvest = self
            .harvester
            .harvest(&url, EndpointShape::SingleResource, None)
            .await?;

        let mut last_commit = Map::new();
        for field in ["sha", "html_url"] {
            if let Some(value) = harvest.envelope.items.get(field) {
                last_commit.insert(field.to_string(), value.clone());
            }
        }
        Ok(last_commit)
    }

    fn checkpoint(&self, envelope: &HarvestEnvelope, processed: usize) -> Result<(), ResolveError> {
        self.store
            .write_document(&envelope.to_document(), &self.dir, &self.filename)
            .map(|_| ())
            .map_err(|source| ResolveError::Checkpoint { processed, source })
    }

    /// Flush pending progress before reporting cancellation.
    fn stop_cancelled(
        &self,
        envelope: &HarvestEnvelope,
        processed: usize,
        written_through: usize,
        report: &mut ResolveReport,
    ) -> ResolveError {
        tracing::warn!(processed, "Resolution cancelled");
        if processed > written_through {
            match self.checkpoint(envelope, processed) {
                Ok(()) => report.checkpoints += 1,
                Err(error) => return error,
            }
        }
        ResolveError::Cancelled { processed }
    }
}

fn descriptor_name(descriptor: &Map<String, Value>) -> Option<String> {
    descriptor
        .get("full_name")
        .or_else(|| descriptor.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::HarvestOptions;
    use crate::http::{HttpResponse, MockTransport};
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn repo(name: &str) -> Value {
        json!({
            "name": name,
            "commits_url": format!("https://api.github.com/repos/o/{name}/commits{{/sha}}")
        })
    }

    fn commit_url(name: &str) -> String {
        format!("https://api.github.com/repos/o/{name}/commits/master")
    }

    fn push_commit(mock: &MockTransport, name: &str, sha: &str) {
        mock.push_response(
            commit_url(name),
            HttpResponse::json(
                200,
                &json!({"sha": sha, "html_url": format!("https://github.com/o/{name}/commit/{sha}"), "stats": {}}),
            ),
        );
    }

    fn resolver(mock: &MockTransport, store: &MemoryStore) -> LastCommitResolver {
        let harvester = PaginatedHarvester::new(Arc::new(mock.clone()), HarvestOptions::default());
        LastCommitResolver::new(harvester, Arc::new(store.clone()), "out", "repos_last_commit.json")
    }

    /// One repository per `(name, sha)` pair, each with a commit response queued.
    fn fixture(repos: &[(&str, &str)]) -> (MockTransport, MemoryStore, HarvestEnvelope) {
        let mock = MockTransport::new();
        for (name, sha) in repos {
            push_commit(&mock, name, sha);
        }
        let items = repos.iter().map(|(name, _)| repo(name)).collect();
        (mock, MemoryStore::new(), HarvestEnvelope::from_items(items))
    }

    fn cancel_at(resolver: &LastCommitResolver, at: usize) -> ProgressCallback {
        let cancel = resolver.harvester.cancel_flag();
        Box::new(move |event| {
            if let HarvestProgress::ResolvedCommit { index, .. } = event
                && index == at
            {
                cancel.store(true, Ordering::SeqCst);
            }
        })
    }

    #[test]
    fn test_commit_url_substitution() {
        let mock = MockTransport::new();
        let store = MemoryStore::new();
        let resolver = resolver(&mock, &store);
        assert_eq!(
            resolver.commit_url("https://api.github.com/repos/o/r/commits{/sha}"),
            Some("https://api.github.com/repos/o/r/commits/master".to_string())
        );
        assert_eq!(resolver.commit_url("https://api.github.com/repos/o/r/commits"), None);

        let resolver = resolver.with_branch("main");
        assert_eq!(
            resolver.commit_url("https://x.test/commits{/sha}"),
            Some("https://x.test/commits/main".to_string())
        );
        let resolver = resolver.with_branch("/develop");
        assert_eq!(
            resolver.commit_url("https://x.test/commits{/sha}"),
            Some("https://x.test/commits/develop".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolves_and_checkpoints_every_item() {
        let (mock, store, repos) = fixture(&[("a", "111"), ("b", "222")]);

        let report = resolver(&mock, &store)
            .resolve_all(repos, None)
            .await
            .unwrap();

        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.checkpoints, 2);
        assert_eq!(report.envelope.items[0]["last_commit"]["sha"], "111");
        assert_eq!(
            report.envelope.items[1]["last_commit"],
            json!({"sha": "222", "html_url": "https://github.com/o/b/commit/222"})
        );

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].1["items"][1].get("last_commit").is_none());
        assert_eq!(
            store.get("out/repos_last_commit.json"),
            Some(report.envelope.to_document())
        );
    }

    #[tokio::test]
    async fn test_failure_leaves_empty_commit_and_continues() {
        let mock = MockTransport::new();
        mock.push_response(
            commit_url("a"),
            HttpResponse::json(422, &json!({"message": "No commit found for SHA: master"})),
        );
        push_commit(&mock, "b", "222");
        let store = MemoryStore::new();

        let report = resolver(&mock, &store)
            .resolve_all(HarvestEnvelope::from_items(vec![repo("a"), repo("b")]), None)
            .await
            .unwrap();

        assert_eq!(report.envelope.items[0]["last_commit"], json!({}));
        assert_eq!(report.envelope.items[1]["last_commit"]["sha"], "222");
        assert_eq!(report.resolved, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_descriptor_problems_do_not_request() {
        let mock = MockTransport::new();
        let store = MemoryStore::new();
        let items = vec![
            json!({"name": "no-url"}),
            json!({"name": "no-placeholder", "commits_url": "https://api.github.com/repos/o/x/commits"}),
            json!("not a repo"),
        ];

        let report = resolver(&mock, &store)
            .resolve_all(HarvestEnvelope::from_items(items), None)
            .await
            .unwrap();

        assert!(mock.requested_urls().is_empty());
        assert_eq!(report.envelope.items[0]["last_commit"], json!({}));
        assert_eq!(report.envelope.items[1]["last_commit"], json!({}));
        assert_eq!(report.envelope.items[2], json!("not a repo"));
        assert_eq!(report.failed, 2);
        // Two descriptors checkpointed, plus the final write covering the skipped entry.
        assert_eq!(report.checkpoints, 3);
    }

    #[tokio::test]
    async fn test_every_n_policy_writes_at_interval_and_end() {
        let (mock, store, repos) = fixture(&[("a", "1"), ("b", "2"), ("c", "3")]);

        let report = resolver(&mock, &store)
            .with_checkpoint_policy(CheckpointPolicy::Every(2))
            .resolve_all(repos, None)
            .await
            .unwrap();

        assert_eq!(report.checkpoints, 2);
        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].1["items"][2].get("last_commit").is_none());
        assert_eq!(writes[1].1["items"][2]["last_commit"]["sha"], "3");
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_fatal() {
        let (mock, store, repos) = fixture(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let store = store.fail_after(1);

        let err = resolver(&mock, &store)
            .resolve_all(repos, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Checkpoint { processed: 2, .. }));
        assert_eq!(mock.requested_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_after_k_leaves_first_k_on_disk() {
        let (mock, store, repos) = fixture(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let resolver = resolver(&mock, &store);
        let callback = cancel_at(&resolver, 2);

        let err = resolver
            .resolve_all(repos, Some(&callback))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Cancelled { processed: 2 }));
        let stored = store.get("out/repos_last_commit.json").unwrap();
        assert_eq!(stored["items"][0]["last_commit"]["sha"], "1");
        assert_eq!(stored["items"][1]["last_commit"]["sha"], "2");
        assert!(stored["items"][2].get("last_commit").is_none());
        assert_eq!(mock.requested_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_flushes_pending_interval_checkpoint() {
        let (mock, store, repos) = fixture(&[("a", "1"), ("b", "2")]);
        let resolver = resolver(&mock, &store).with_checkpoint_policy(CheckpointPolicy::Every(10));
        let callback = cancel_at(&resolver, 1);

        let err = resolver
            .resolve_all(repos, Some(&callback))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Cancelled { processed: 1 }));
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1["items"][0]["last_commit"]["sha"], "1");
    }

    #[tokio::test]
    async fn test_not_a_collection() {
        let mock = MockTransport::new();
        let store = MemoryStore::new();
        let err = resolver(&mock, &store)
            .resolve_all(HarvestEnvelope { items: repo("a") }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotACollection { found: "object" }));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_collection_still_writes() {
        let mock = MockTransport::new();
        let store = MemoryStore::new();
        let report = resolver(&mock, &store)
            .resolve_all(HarvestEnvelope::new(), None)
            .await
            .unwrap();
        assert_eq!(report.checkpoints, 1);
        assert_eq!(store.get("out/repos_last_commit.json"), Some(json!({"items": []})));
    }
}
