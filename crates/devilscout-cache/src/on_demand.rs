//! Lazily populated caches.
//!
//! An [`OnDemandCache`] fetches a key the first time someone asks for it and
//! keeps it fresh for as long as it keeps being read. Every refresh cycle first
//! drops cells nobody has read within the purge TTL, then re-fetches the rest.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{StreamExt, stream};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cell::{PendingUpdate, VersionedCell};
use crate::error::{FetchError, FetchResult};
use crate::pool::FetchPool;
use crate::source::DataSource;
use crate::store::{Cache, CacheEntry, CacheStore, RefreshReport};

pub struct OnDemandCache<S: DataSource> {
    store: CacheStore<S::Key, S::Value>,
    source: Arc<S>,
    pool: FetchPool,
    purge_ttl: Duration,
    /// Per-key locks that collapse concurrent first accesses into one fetch
    creating: DashMap<S::Key, Creation>,
}

/// First-access slot for one key. Holds whether the leading attempt created a
/// cell once it finished; `None` while in flight or if the leader was dropped.
type Creation = Arc<Mutex<Option<bool>>>;

/// Removes a key's creation slot when the leading `get` finishes or is dropped.
struct CreationGuard<'a, K: Eq + Hash> {
    creating: &'a DashMap<K, Creation>,
    key: &'a K,
    slot: &'a Creation,
}

impl<K: Eq + Hash> Drop for CreationGuard<'_, K> {
    fn drop(&mut self) {
        self.creating
            .remove_if(self.key, |_, current| Arc::ptr_eq(current, self.slot));
    }
}

enum Outcome<V> {
    Unchanged,
    Changed(PendingUpdate<V>),
    Missing,
}

impl<S: DataSource> OnDemandCache<S> {
    pub fn new(name: impl Into<Arc<str>>, source: Arc<S>, pool: FetchPool, purge_ttl: Duration) -> Self {
        Self {
            store: CacheStore::new(name),
            source,
            pool,
            purge_ttl,
            creating: DashMap::new(),
        }
    }

    pub fn purge_ttl(&self) -> Duration {
        self.purge_ttl
    }

    pub fn store(&self) -> &CacheStore<S::Key, S::Value> {
        &self.store
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Read `key`, fetching and creating it on first access.
    ///
    /// Returns `None` when the upstream has no datum for the key or the first
    /// fetch failed; nothing is cached in that case. Callers that were waiting
    /// on that same fetch share its outcome, later calls try again.
    pub async fn get(&self, key: &S::Key) -> Option<CacheEntry<S::Value>> {
        if let Some(entry) = self.store.get(key) {
            return Some(entry);
        }

        let slot = Arc::clone(self.creating.entry(key.clone()).or_default().value());
        let mut outcome = slot.lock().await;
        match *outcome {
            Some(true) => return self.store.get(key),
            Some(false) => return None,
            None => {}
        }
        let _cleanup = CreationGuard {
            creating: &self.creating,
            key,
            slot: &slot,
        };
        // another caller may have finished creating it before we got the slot
        if let Some(entry) = self.store.get(key) {
            return Some(entry);
        }

        let created = match self.create(key).await {
            Ok(created) => created,
            Err(e) => {
                warn!(cache = %self.store.name(), key = %key, error = %e, "Failed to fetch new entry");
                false
            }
        };
        *outcome = Some(created);

        if created { self.store.get(key) } else { None }
    }

    /// Fetch and insert a key that is not cached yet. Returns whether a cell was
    /// created.
    async fn create(&self, key: &S::Key) -> FetchResult<bool> {
        let Some(datum) = self.fetch(key).await? else {
            debug!(cache = %self.store.name(), key = %key, "No upstream data, not caching");
            return Ok(false);
        };

        let value = self.source.create(key, &datum)?;
        let version = self.store.modified();
        self.store
            .insert_with(key.clone(), || VersionedCell::new(value, version));
        debug!(cache = %self.store.name(), key = %key, version, "Created entry");
        Ok(true)
    }

    /// Fetch `key` now and create or update its cell outside the regular cycle.
    ///
    /// Returns whether the cached value changed. Advances the cache version on
    /// change.
    pub async fn refresh_key(&self, key: &S::Key) -> FetchResult<bool> {
        let Some(cell) = self.store.cell(key) else {
            return self.create(key).await;
        };
        let Some(datum) = self.fetch(key).await? else {
            return Ok(false);
        };
        let Some(pending) = cell.prepare(&datum)? else {
            return Ok(false);
        };

        Ok(cell.publish(pending, self.store.modified()))
    }

    async fn fetch(&self, key: &S::Key) -> FetchResult<Option<S::Datum>> {
        let source = Arc::clone(&self.source);
        let key = key.clone();
        self.pool.run(async move { source.fetch(&key).await }).await
    }

    async fn refresh_cell(
        &self,
        key: &S::Key,
        cell: &VersionedCell<S::Value>,
    ) -> FetchResult<Outcome<S::Value>> {
        let Some(datum) = self.fetch(key).await? else {
            return Ok(Outcome::Missing);
        };
        Ok(match cell.prepare(&datum)? {
            Some(pending) => Outcome::Changed(pending),
            None => Outcome::Unchanged,
        })
    }

    fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for (key, cell) in self.store.snapshot() {
            if cell.idle_for(now) <= self.purge_ttl {
                continue;
            }
            // a read between the snapshot and the removal keeps the cell
            if self
                .store
                .remove_if(&key, |cell| cell.idle_for(now) > self.purge_ttl)
            {
                debug!(cache = %self.store.name(), key = %key, "Evicted idle entry");
                self.source.evicted(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

#[async_trait]
impl<S: DataSource> Cache for OnDemandCache<S> {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn size(&self) -> usize {
        self.store.len()
    }

    fn version(&self) -> u64 {
        self.store.version()
    }

    async fn refresh(&self) -> RefreshReport {
        let started = StdInstant::now();
        let mut report = RefreshReport::default();
        let mut batch = self.store.batch();

        report.evicted = self.evict_idle();
        for _ in 0..report.evicted {
            batch.removed();
        }

        let cells = self.store.snapshot();
        report.refreshed = cells.len();
        let mut results = stream::iter(cells)
            .map(|(key, cell)| async move {
                let outcome = self.refresh_cell(&key, &cell).await;
                (key, cell, outcome)
            })
            .buffer_unordered(self.pool.size());

        while let Some((key, cell, outcome)) = results.next().await {
            match outcome {
                Ok(Outcome::Changed(pending)) => {
                    report.changed += 1;
                    batch.changed(cell, pending);
                }
                Ok(Outcome::Unchanged) => {}
                Ok(Outcome::Missing) => {
                    debug!(cache = %self.store.name(), key = %key, "Upstream has no data, keeping entry");
                }
                Err(e) => {
                    report.failed += 1;
                    log_refresh_failure(self.store.name(), &key, &e);
                }
            }
        }

        batch.commit();
        report.version = self.store.version();
        debug!(
            cache = %self.store.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "On-demand refresh pass finished"
        );
        report
    }
}

pub(crate) fn log_refresh_failure(cache: &str, key: &dyn std::fmt::Display, err: &FetchError) {
    match err {
        FetchError::Malformed(_) => {
            warn!(cache = %cache, key = %key, error = %err, "Discarded malformed datum, keeping previous value")
        }
        _ => warn!(cache = %cache, key = %key, error = %err, "Refresh failed, keeping previous value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;

    fn cache(source: Arc<MockSource>) -> Arc<OnDemandCache<MockSource>> {
        Arc::new(OnDemandCache::new(
            "notes",
            source,
            FetchPool::new(4, Duration::from_secs(5)),
            Duration::from_secs(60),
        ))
    }

    fn key(key: &str) -> String {
        key.to_string()
    }

    #[tokio::test]
    async fn test_get_creates_only_after_successful_fetch() {
        let source = Arc::new(MockSource::new());
        let cache = cache(Arc::clone(&source));

        assert!(cache.get(&key("a")).await.is_none());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.version(), 0);

        source.fail("a");
        assert!(cache.get(&key("a")).await.is_none());
        assert_eq!(cache.size(), 0);

        source.set("a", "hello");
        let entry = cache.get(&key("a")).await.unwrap();
        assert_eq!(entry.value.text, "hello");
        assert_eq!(entry.version, 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_cached_get_does_not_fetch_again() {
        let source = Arc::new(MockSource::new());
        source.set("a", "hello");
        let cache = cache(Arc::clone(&source));

        cache.get(&key("a")).await.unwrap();
        cache.get(&key("a")).await.unwrap();

        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_gets_create_one_cell() {
        let source = Arc::new(MockSource::with_delay(Duration::from_millis(50)));
        source.set("a", "hello");
        let cache = cache(Arc::clone(&source));

        let gets = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(&key("a")).await })
        });
        let results = futures_util::future::join_all(gets).await;

        let first = results[0].as_ref().unwrap().as_ref().unwrap().value.clone();
        for result in &results {
            let entry = result.as_ref().unwrap().as_ref().unwrap();
            assert!(Arc::ptr_eq(&first, &entry.value));
        }
        assert_eq!(source.create_count(), 1);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_a_failed_first_fetch() {
        let source = Arc::new(MockSource::with_delay(Duration::from_millis(50)));
        source.fail("a");
        let cache = cache(Arc::clone(&source));

        let gets = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(&key("a")).await })
        });
        let results = futures_util::future::join_all(gets).await;

        assert!(results.iter().all(|r| r.as_ref().unwrap().is_none()));
        assert_eq!(source.fetch_count(), 1);
        assert!(cache.creating.is_empty());

        // the shared failure is not remembered past the attempt
        source.set("a", "hello");
        assert_eq!(cache.get(&key("a")).await.unwrap().value.text, "hello");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_first_get_releases_its_slot() {
        let source = Arc::new(MockSource::new());
        source.hang("a");
        let cache = cache(Arc::clone(&source));

        let cancelled = tokio::time::timeout(Duration::from_secs(1), cache.get(&key("a"))).await;
        assert!(cancelled.is_err());
        assert!(cache.creating.is_empty());

        source.set("a", "hello");
        assert_eq!(cache.get(&key("a")).await.unwrap().value.text, "hello");
        assert!(cache.creating.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_key_publishes_value_and_version_together() {
        let source = Arc::new(MockSource::new());
        source.set("a", "v1");
        let cache = cache(Arc::clone(&source));
        let before = cache.get(&key("a")).await.unwrap();

        source.set("a", "v2");
        assert!(cache.refresh_key(&key("a")).await.unwrap());

        let after = cache.get(&key("a")).await.unwrap();
        assert_eq!(after.value.text, "v2");
        assert!(after.version > before.version);
        assert_eq!(after.version, cache.version());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_cell_is_evicted_on_refresh() {
        let source = Arc::new(MockSource::new());
        source.set("a", "hello");
        let cache = cache(Arc::clone(&source));
        cache.get(&key("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let report = cache.refresh().await;

        assert_eq!(report.evicted, 1);
        assert_eq!(report.refreshed, 0);
        assert_eq!(cache.size(), 0);
        assert!(!cache.store().contains_key(&key("a")));
        assert_eq!(report.version, 2);
        assert_eq!(source.evicted_keys(), vec![key("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_before_ttl_prevents_eviction() {
        let source = Arc::new(MockSource::new());
        source.set("a", "hello");
        let cache = cache(Arc::clone(&source));
        cache.get(&key("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        cache.get(&key("a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        let report = cache.refresh().await;

        assert_eq!(report.evicted, 0);
        assert_eq!(report.refreshed, 1);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_refresh_updates_and_bumps_version_once() {
        let source = Arc::new(MockSource::new());
        for name in ["a", "b", "c"] {
            source.set(name, "v1");
        }
        let cache = cache(Arc::clone(&source));
        for name in ["a", "b", "c"] {
            cache.get(&key(name)).await.unwrap();
        }
        assert_eq!(cache.version(), 3);

        for name in ["a", "b", "c"] {
            source.set(name, "v2");
        }
        let report = cache.refresh().await;

        assert_eq!(report.changed, 3);
        assert_eq!(report.version, 4);
        assert_eq!(cache.get(&key("b")).await.unwrap().value.text, "v2");
        assert_eq!(cache.get(&key("b")).await.unwrap().version, 4);

        let report = cache.refresh().await;
        assert!(!report.has_changes());
        assert_eq!(cache.version(), 4);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_value() {
        let source = Arc::new(MockSource::new());
        source.set("a", "good");
        source.set("b", "good");
        let cache = cache(Arc::clone(&source));
        cache.get(&key("a")).await.unwrap();
        cache.get(&key("b")).await.unwrap();

        source.fail("a");
        source.set("b", "");
        let report = cache.refresh().await;

        assert_eq!(report.failed, 2);
        assert_eq!(cache.version(), 2);
        assert_eq!(cache.get(&key("a")).await.unwrap().value.text, "good");
        assert_eq!(cache.get(&key("b")).await.unwrap().value.text, "good");
    }

    #[tokio::test]
    async fn test_missing_upstream_datum_keeps_entry() {
        let source = Arc::new(MockSource::new());
        source.set("a", "good");
        let cache = cache(Arc::clone(&source));
        cache.get(&key("a")).await.unwrap();

        source.remove("a");
        let report = cache.refresh().await;

        assert_eq!(report.failed, 0);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_refresh_key_creates_then_updates() {
        let source = Arc::new(MockSource::new());
        source.set("a", "v1");
        let cache = cache(Arc::clone(&source));

        assert!(cache.refresh_key(&key("a")).await.unwrap());
        assert_eq!(cache.size(), 1);
        assert!(!cache.refresh_key(&key("a")).await.unwrap());

        source.set("a", "v2");
        assert!(cache.refresh_key(&key("a")).await.unwrap());
        assert_eq!(cache.version(), 2);
        assert_eq!(cache.get(&key("a")).await.unwrap().value.text, "v2");
    }
}
