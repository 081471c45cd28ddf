//! Error types for cache refreshes

use std::time::Duration;

use thiserror::Error;

/// Result type for a single upstream fetch
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors from a single upstream fetch.
///
/// Every variant is transient: the affected key keeps its last-known-good value
/// and is retried on the next scheduled tick, never inline.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request did not complete within the pool's fetch timeout
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or transport failure
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The upstream answered with a non-success status
    #[error("upstream returned HTTP {0}")]
    Http(u16),

    /// The payload could not be decoded or applied
    #[error("malformed datum: {0}")]
    Malformed(String),

    /// The fetch pool has been shut down
    #[error("fetch pool is closed")]
    PoolClosed,

    /// The fetch task panicked
    #[error("fetch task panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// A raw datum that cannot be applied to a cached value.
///
/// Returned from [`Cacheable::update`](crate::Cacheable::update) and from value
/// construction. The whole datum is discarded for the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed datum: {0}")]
pub struct MalformedDatum(pub String);

impl MalformedDatum {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<MalformedDatum> for FetchError {
    fn from(err: MalformedDatum) -> Self {
        FetchError::Malformed(err.0)
    }
}
