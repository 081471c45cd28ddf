//! Error types for the Blue Alliance client

use std::time::Duration;

use devilscout_cache::FetchError;
use thiserror::Error;

/// Errors raised while setting up the client.
///
/// Request-time failures are reported as [`FetchError`] instead, since the
/// caches treat every one of them as transient.
#[derive(Debug, Error)]
pub enum TbaError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Map a transport error onto the cache's transient error kinds.
pub(crate) fn fetch_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else if err.is_decode() {
        FetchError::malformed(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Http(status.as_u16())
    } else {
        FetchError::upstream(err.to_string())
    }
}
