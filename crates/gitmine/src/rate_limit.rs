//! Quota tracking from rate-limit response headers.
//!
//! The upstream API reports its quota on every response through
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset` (epoch seconds). The
//! [`RateLimitGovernor`] looks at the most recent state before the next
//! request and sleeps until the reset boundary when the quota is spent.
//!
//! [`RequestPacer`] is an optional, proactive limiter on top of that, using
//! the governor crate to cap requests per second.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;

use crate::http::{HttpHeaders, header_get};

pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";

/// Default pause added after the reset instant before requesting again.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// A rate-limit header was absent or not a number.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitHeaderError {
    #[error("missing {0} header")]
    Missing(&'static str),

    #[error("invalid {header} header value {value:?}")]
    Invalid { header: &'static str, value: String },
}

/// Quota as reported by the most recent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests left in the current window.
    pub remaining: u64,
    /// Unix timestamp (seconds) when the window resets.
    pub reset_at_epoch_seconds: i64,
    /// Window size, when the server reports it.
    pub limit: Option<u64>,
}

impl RateLimitState {
    pub fn new(remaining: u64, reset_at_epoch_seconds: i64) -> Self {
        Self {
            remaining,
            reset_at_epoch_seconds,
            limit: None,
        }
    }

    /// Read the quota from response headers.
    ///
    /// `X-RateLimit-Limit` is optional; the other two are required.
    pub fn from_headers(headers: &HttpHeaders) -> Result<Self, RateLimitHeaderError> {
        let remaining = parse_header::<u64>(headers, REMAINING_HEADER)?;
        let reset_at_epoch_seconds = parse_header::<i64>(headers, RESET_HEADER)?;
        let limit = header_get(headers, LIMIT_HEADER).and_then(|v| v.trim().parse().ok());

        Ok(Self {
            remaining,
            reset_at_epoch_seconds,
            limit,
        })
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// The reset instant, if it is a representable timestamp.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset_at_epoch_seconds, 0)
    }
}

fn parse_header<T: std::str::FromStr>(
    headers: &HttpHeaders,
    name: &'static str,
) -> Result<T, RateLimitHeaderError> {
    let value = header_get(headers, name).ok_or(RateLimitHeaderError::Missing(name))?;
    value
        .trim()
        .parse()
        .map_err(|_| RateLimitHeaderError::Invalid {
            header: name,
            value: value.to_string(),
        })
}

/// Source of the current wall-clock time, in epoch seconds.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

/// Wall clock backed by chrono.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Result of asking the governor for permission to send the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Quota left, no wait.
    Immediate,
    /// Quota exhausted; the caller was suspended for this long.
    Waited(Duration),
}

/// Blocks the caller until the observed quota allows another request.
#[derive(Clone)]
pub struct RateLimitGovernor {
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
}

impl Default for RateLimitGovernor {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_SAFETY_MARGIN)
    }
}

impl RateLimitGovernor {
    pub fn new(clock: Arc<dyn Clock>, safety_margin: Duration) -> Self {
        Self {
            clock,
            safety_margin,
        }
    }

    #[must_use]
    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// How long the caller must wait before the next request.
    ///
    /// Zero while quota remains; otherwise the time left until the reset
    /// instant (never negative) plus the safety margin.
    pub fn wait_for(&self, state: &RateLimitState) -> Duration {
        if !state.is_exhausted() {
            return Duration::ZERO;
        }

        let now = self.clock.now_epoch_seconds();
        let until_reset = state.reset_at_epoch_seconds.saturating_sub(now).max(0);
        Duration::from_secs(until_reset as u64) + self.safety_margin
    }

    /// Admit the next request, sleeping through the reset boundary if needed.
    pub async fn admit(&self, state: &RateLimitState) -> Admission {
        if !state.is_exhausted() {
            return Admission::Immediate;
        }

        let wait = self.wait_for(state);
        tracing::warn!(
            wait_secs = wait.as_secs(),
            reset_at = state.reset_at_epoch_seconds,
            "Rate limit exhausted, waiting for reset"
        );
        tokio::time::sleep(wait).await;
        Admission::Waited(wait)
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request pacing using the governor crate.
///
/// ```ignore
/// let pacer = RequestPacer::new(5); // 5 requests per second
/// pacer.wait().await;
/// transport.send(request).await?;
/// ```
#[derive(Clone)]
pub struct RequestPacer {
    inner: Arc<DirectRateLimiter>,
}

impl RequestPacer {
    /// Create a pacer allowing `requests_per_second` (0 is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the pacer allows another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_epoch_seconds(&self) -> i64 {
            self.0
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn governor_at(now: i64, margin: Duration) -> RateLimitGovernor {
        RateLimitGovernor::new(Arc::new(FixedClock(now)), margin)
    }

    #[test]
    fn test_from_headers() {
        let state = RateLimitState::from_headers(&headers(&[
            ("x-ratelimit-remaining", "4999"),
            ("x-ratelimit-reset", "1700000000"),
            ("x-ratelimit-limit", "5000"),
        ]))
        .expect("headers should parse");
        assert_eq!(state.remaining, 4999);
        assert_eq!(state.reset_at_epoch_seconds, 1_700_000_000);
        assert_eq!(state.limit, Some(5000));
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_from_headers_missing_remaining() {
        let err = RateLimitState::from_headers(&headers(&[("X-RateLimit-Reset", "1")]))
            .expect_err("missing header");
        assert_eq!(err, RateLimitHeaderError::Missing(REMAINING_HEADER));
    }

    #[test]
    fn test_from_headers_non_numeric_reset() {
        let err = RateLimitState::from_headers(&headers(&[
            ("X-RateLimit-Remaining", "3"),
            ("X-RateLimit-Reset", "soon"),
        ]))
        .expect_err("invalid header");
        assert!(matches!(
            err,
            RateLimitHeaderError::Invalid { header: RESET_HEADER, ref value } if value == "soon"
        ));
    }

    #[test]
    fn test_wait_for_with_quota_left_is_zero() {
        let governor = governor_at(1_000, Duration::from_secs(1));
        assert_eq!(
            governor.wait_for(&RateLimitState::new(1, 5_000)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_wait_for_exhausted_includes_margin() {
        let governor = governor_at(1_000, Duration::from_secs(1));
        assert_eq!(
            governor.wait_for(&RateLimitState::new(0, 1_030)),
            Duration::from_secs(31)
        );
    }

    #[test]
    fn test_wait_for_reset_in_the_past_is_margin_only() {
        let governor = governor_at(2_000, Duration::ZERO);
        assert_eq!(
            governor.wait_for(&RateLimitState::new(0, 1_000)),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_returns_immediately_with_quota() {
        let governor = governor_at(1_000, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let admission = governor.admit(&RateLimitState::new(10, 9_999)).await;
        assert_eq!(admission, Admission::Immediate);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_sleeps_until_reset() {
        let governor = governor_at(1_000, Duration::ZERO);
        let start = tokio::time::Instant::now();
        let admission = governor.admit(&RateLimitState::new(0, 1_003)).await;
        assert_eq!(admission, Admission::Waited(Duration::from_secs(3)));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn test_reset_at() {
        let state = RateLimitState::new(0, 0);
        assert_eq!(state.reset_at().map(|t| t.timestamp()), Some(0));
    }

    #[tokio::test]
    async fn test_request_pacer_allows_first_request() {
        let pacer = RequestPacer::new(100);
        let start = std::time::Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        // Zero falls back to one request per second.
        let _slow = RequestPacer::new(0).clone();
    }
}
