//! Gitmine - rate-limit aware GitHub metadata harvesting.
//!
//! This library fetches paginated GitHub API endpoints into flat
//! `{"items": [...]}` JSON documents, and derives filtered views of those
//! documents (field projection, commit time windows, labelled issue titles)
//! for offline analysis.
//!
//! # Features
//!
//! - `test-support` - Exposes [`http::MockTransport`] and
//!   [`storage::MemoryStore`] for integration tests.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitmine::{EndpointShape, HarvestOptions, PaginatedHarvester, ReqwestTransport};
//!
//! let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
//! let harvester = PaginatedHarvester::new(transport, HarvestOptions::default());
//!
//! let tags = harvester
//!     .harvest(
//!         "https://api.github.com/repos/spring-projects/spring-boot/tags",
//!         EndpointShape::CollectionOfPages,
//!         None,
//!     )
//!     .await?;
//! println!("{} pages", tags.pages_fetched());
//! ```

pub mod batch;
pub mod clone;
pub mod filter;
pub mod harvest;
pub mod http;
pub mod last_commit;
pub mod pagination;
pub mod progress;
pub mod rate_limit;
pub mod storage;

pub use batch::{BatchError, BatchHarvester, BatchReport, ResourceKind, read_repo_list};
pub use clone::{CloneError, CloneReport, Credentials, GitCliCloner, RepositoryCloner, clone_all};
pub use filter::{CommitOrder, FilterError, FilterOutcome, RecordError, TimeWindow};
pub use harvest::{
    EndpointShape, HarvestEnvelope, HarvestError, HarvestOptions, HarvestStats, PaginatedHarvest,
    PaginatedHarvester,
};
pub use http::{HttpTransport, reqwest_transport::ReqwestTransport};
pub use last_commit::{CheckpointPolicy, LastCommitResolver, ResolveError, ResolveReport};
pub use pagination::{PageLinks, parse_link_header};
pub use progress::{HarvestProgress, ProgressCallback};
pub use rate_limit::{Admission, Clock, RateLimitGovernor, RateLimitState, RequestPacer, SystemClock};
pub use storage::{DocumentStore, JsonFileStore, StorageError};
