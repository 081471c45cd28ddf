//! Upstream collaborators of a cache.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

use crate::cell::Cacheable;
use crate::error::{FetchResult, MalformedDatum};

/// Fetches raw data for one cache and builds values from it.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;
    type Datum: Send + 'static;
    type Value: Cacheable<Self::Datum>;

    /// Fetch the current datum for `key`.
    ///
    /// `Ok(None)` means the upstream has nothing for the key. Errors are
    /// transient and are retried on the next scheduled refresh, never inline.
    async fn fetch(&self, key: &Self::Key) -> FetchResult<Option<Self::Datum>>;

    /// Build the initial value for a key seen for the first time.
    fn create(&self, key: &Self::Key, datum: &Self::Datum) -> Result<Self::Value, MalformedDatum>;

    /// Called once the cache dropped `key`, so the source can release any
    /// per-key state it keeps between fetches.
    fn evicted(&self, _key: &Self::Key) {}
}

/// Supplies the working set of a polling cache.
#[async_trait]
pub trait ActiveKeys<K>: Send + Sync {
    async fn active_keys(&self) -> anyhow::Result<HashSet<K>>;
}
