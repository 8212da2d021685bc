//! The paginated, rate-limit-aware fetch loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::pagination::parse_link_header;
use crate::progress::{HarvestProgress, ProgressCallback, emit};
use crate::rate_limit::{RateLimitGovernor, RateLimitState, RequestPacer};

use super::envelope::{EndpointShape, HarvestEnvelope};
use super::error::{HarvestError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("gitmine/", env!("CARGO_PKG_VERSION"));
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Consecutive quota-exhausted rejections tolerated for one URL.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Per-harvest request settings.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Stop after this many pages even if more exist. `None` is unbounded.
    ///
    /// The first page is always fetched.
    pub max_pages: Option<u32>,
    pub user_agent: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
        }
    }
}

impl HarvestOptions {
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Counters for one harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub pages_fetched: u32,
    /// The page cap stopped the harvest while a next page was still advertised.
    pub truncated: bool,
    /// Quota reported by the last response.
    pub rate_limit: Option<RateLimitState>,
}

/// A completed harvest.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedHarvest {
    pub envelope: HarvestEnvelope,
    pub stats: HarvestStats,
}

impl PaginatedHarvest {
    #[inline]
    pub fn pages_fetched(&self) -> u32 {
        self.stats.pages_fetched
    }

    #[inline]
    pub fn truncated(&self) -> bool {
        self.stats.truncated
    }
}

/// Follows `rel="next"` links until exhaustion, merging every page into one
/// envelope and honoring the server's quota between requests.
#[derive(Clone)]
pub struct PaginatedHarvester {
    transport: Arc<dyn HttpTransport>,
    governor: RateLimitGovernor,
    pacer: Option<RequestPacer>,
    options: HarvestOptions,
    cancel: Arc<AtomicBool>,
}

impl PaginatedHarvester {
    pub fn new(transport: Arc<dyn HttpTransport>, options: HarvestOptions) -> Self {
        Self {
            transport,
            governor: RateLimitGovernor::default(),
            pacer: None,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_governor(mut self, governor: RateLimitGovernor) -> Self {
        self.governor = governor;
        self
    }

    /// Cap outgoing requests per second, in addition to quota tracking.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Option<RequestPacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Share a cancellation flag; raising it stops the harvest before the
    /// next request.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Harvest `url` into a fresh envelope.
    pub async fn harvest(
        &self,
        url: &str,
        shape: EndpointShape,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<PaginatedHarvest> {
        let mut envelope = HarvestEnvelope::new();
        let stats = self
            .harvest_into(url, shape, &mut envelope, on_progress)
            .await?;
        Ok(PaginatedHarvest { envelope, stats })
    }

    /// Harvest `url`, merging every page into `envelope`.
    ///
    /// On error the envelope keeps whatever pages were merged before the
    /// failure.
    pub async fn harvest_into(
        &self,
        url: &str,
        shape: EndpointShape,
        envelope: &mut HarvestEnvelope,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<HarvestStats> {
        let mut stats = HarvestStats::default();
        let first = encode_angle_brackets(url);
        let mut visited = HashSet::from([first.clone()]);
        let mut next = Some(first);
        let mut last_page = None;
        let mut rate_limited_retries = 0u32;

        emit(
            on_progress,
            HarvestProgress::HarvestStarted {
                url: url.to_string(),
            },
        );

        while let Some(url) = next.take() {
            if self.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }
            if let Some(pacer) = &self.pacer {
                pacer.wait().await;
            }

            let response = self
                .transport
                .send(self.request(&url))
                .await
                .map_err(|source| HarvestError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let state = match RateLimitState::from_headers(&response.headers) {
                Ok(state) => state,
                Err(_) if !response.is_success() => return Err(status_error(url, &response)),
                Err(source) => return Err(HarvestError::Protocol { url, source }),
            };
            stats.rate_limit = Some(state);

            if is_quota_rejection(&response, &state) {
                if rate_limited_retries >= MAX_RATE_LIMIT_RETRIES {
                    return Err(status_error(url, &response));
                }
                rate_limited_retries += 1;
                tracing::debug!(url = %url, status = response.status, "Request rejected by rate limit, retrying after reset");
                self.wait_for_quota(&state, on_progress).await;
                next = Some(url);
                continue;
            }
            rate_limited_retries = 0;

            if !response.is_success() {
                return Err(status_error(url, &response));
            }

            let links = parse_link_header(response.header("link"));
            let body: Value = serde_json::from_slice(&response.body)
                .map_err(|e| HarvestError::malformed(&url, format!("invalid JSON: {e}")))?;
            envelope
                .merge(shape, body)
                .map_err(|e| HarvestError::malformed(&url, e.to_string()))?;

            stats.pages_fetched += 1;
            // The final page carries no rel="last"; keep the last known count.
            last_page = links.last_page.or(last_page);
            tracing::debug!(
                url = %url,
                page = stats.pages_fetched,
                last_page = ?last_page,
                remaining = state.remaining,
                "Fetched page"
            );
            emit(
                on_progress,
                HarvestProgress::PageFetched {
                    page: stats.pages_fetched,
                    last_page,
                    remaining: state.remaining,
                },
            );

            let Some(next_url) = links.next else {
                break;
            };

            if let Some(max_pages) = self.options.max_pages
                && stats.pages_fetched >= max_pages
            {
                tracing::warn!(
                    max_pages,
                    next = %next_url,
                    "Page cap reached, harvest truncated"
                );
                stats.truncated = true;
                break;
            }

            let next_url = encode_angle_brackets(&next_url);
            if !visited.insert(next_url.clone()) {
                tracing::warn!(next = %next_url, "Next link points to a page already fetched, stopping");
                break;
            }

            self.wait_for_quota(&state, on_progress).await;
            next = Some(next_url);
        }

        emit(
            on_progress,
            HarvestProgress::HarvestComplete {
                pages: stats.pages_fetched,
                truncated: stats.truncated,
            },
        );

        Ok(stats)
    }

    fn request(&self, url: &str) -> HttpRequest {
        let request = HttpRequest::get(url)
            .with_header("Accept", GITHUB_ACCEPT)
            .with_header("User-Agent", self.options.user_agent.as_str());

        match &self.options.token {
            Some(token) => request.with_header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn wait_for_quota(&self, state: &RateLimitState, on_progress: Option<&ProgressCallback>) {
        if !state.is_exhausted() {
            return;
        }

        emit(
            on_progress,
            HarvestProgress::RateLimitWait {
                wait: self.governor.wait_for(state),
                reset_at: state.reset_at_epoch_seconds,
            },
        );
        self.governor.admit(state).await;
    }
}

/// Percent-encode `<` and `>`, which appear in search qualifiers such as
/// `stars:>100` and are rejected by HTTP clients when sent raw.
pub fn encode_angle_brackets(url: &str) -> String {
    url.replace('<', "%3C").replace('>', "%3E")
}

fn is_quota_rejection(response: &HttpResponse, state: &RateLimitState) -> bool {
    matches!(response.status, 403 | 429) && state.is_exhausted()
}

fn status_error(url: String, response: &HttpResponse) -> HarvestError {
    let message = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|body| {
            body.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    HarvestError::Status {
        url,
        status: response.status,
        message,
    }
}
