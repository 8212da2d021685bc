//! Paginated harvesting of GitHub API endpoints into `{"items": ...}` documents.

mod envelope;
mod error;
mod harvester;

pub use envelope::{EndpointShape, HarvestEnvelope, ShapeMismatch, json_type};
pub use error::{HarvestError, Result};
pub use harvester::{
    DEFAULT_USER_AGENT, GITHUB_ACCEPT, HarvestOptions, HarvestStats, PaginatedHarvest,
    PaginatedHarvester, encode_angle_brackets,
};
