use thiserror::Error;

use crate::http::HttpError;
use crate::rate_limit::RateLimitHeaderError;

/// Errors that abort a harvest.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network or connection failure (timeouts included).
    #[error("transport error requesting {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: HttpError,
    },

    /// The response lacked usable rate-limit headers.
    #[error("protocol error from {url}: {source}")]
    Protocol {
        url: String,
        #[source]
        source: RateLimitHeaderError,
    },

    /// The body was not JSON of the shape the endpoint promises.
    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        url: String,
        status: u16,
        message: Option<String>,
    },

    /// The cancellation flag was raised between pages.
    #[error("harvest cancelled")]
    Cancelled,
}

impl HarvestError {
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status, for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
