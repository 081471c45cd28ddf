//! Caches that follow a declared working set.
//!
//! A [`PollingCache`] never creates entries on read. Every refresh it asks its
//! [`ActiveKeys`] provider which keys matter right now, drops keys that left the
//! set, and fetches every active key through the shared [`FetchPool`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tracing::{debug, warn};

use crate::cascade::Cascade;
use crate::error::FetchError;
use crate::on_demand::log_refresh_failure;
use crate::pool::FetchPool;
use crate::source::{ActiveKeys, DataSource};
use crate::store::{Cache, CacheEntry, CacheStore, RefreshReport};

pub struct PollingCache<S: DataSource> {
    store: CacheStore<S::Key, S::Value>,
    source: Arc<S>,
    pool: FetchPool,
    active: Option<Arc<dyn ActiveKeys<S::Key>>>,
    cascade: Option<Cascade<S::Key>>,
}

impl<S: DataSource> PollingCache<S> {
    pub fn new(name: impl Into<Arc<str>>, source: Arc<S>, pool: FetchPool) -> Self {
        Self {
            store: CacheStore::new(name),
            source,
            pool,
            active: None,
            cascade: None,
        }
    }

    /// Provider consulted by [`Cache::refresh`]. Without one, a scheduled
    /// refresh only re-fetches the keys already tracked.
    pub fn with_active_keys(mut self, provider: Arc<dyn ActiveKeys<S::Key>>) -> Self {
        self.active = Some(provider);
        self
    }

    /// Notify a dependent cache whenever an entry is created or changes.
    pub fn with_cascade(mut self, cascade: Cascade<S::Key>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn store(&self) -> &CacheStore<S::Key, S::Value> {
        &self.store
    }

    /// Read `key` if it is tracked. Never fetches.
    pub fn get(&self, key: &S::Key) -> Option<CacheEntry<S::Value>> {
        self.store.get(key)
    }

    /// Bring the cache in line with `active`.
    ///
    /// Keys outside `active` are evicted immediately. A failed fetch leaves the
    /// key's previous value in place, or leaves it absent if it was new.
    pub async fn refresh_all(&self, active: &HashSet<S::Key>) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut batch = self.store.batch();

        for key in self.store.keys() {
            if !active.contains(&key) && self.store.remove(&key) {
                debug!(cache = %self.store.name(), key = %key, "Dropped inactive key");
                self.source.evicted(&key);
                report.evicted += 1;
                batch.removed();
            }
        }

        report.refreshed = active.len();
        let mut results = stream::iter(active.iter().cloned())
            .map(|key| {
                let source = Arc::clone(&self.source);
                async move {
                    let fetched = self
                        .pool
                        .run({
                            let key = key.clone();
                            async move { source.fetch(&key).await }
                        })
                        .await;
                    (key, fetched)
                }
            })
            .buffer_unordered(self.pool.size());

        let mut touched = Vec::new();
        while let Some((key, fetched)) = results.next().await {
            let datum = match fetched {
                Ok(Some(datum)) => datum,
                Ok(None) => {
                    debug!(cache = %self.store.name(), key = %key, "Upstream has no data for active key");
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    log_refresh_failure(self.store.name(), &key, &e);
                    continue;
                }
            };

            if let Some(cell) = self.store.cell(&key) {
                match cell.prepare(&datum) {
                    Ok(Some(pending)) => {
                        report.changed += 1;
                        batch.changed(cell, pending);
                        touched.push(key);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        report.failed += 1;
                        log_refresh_failure(self.store.name(), &key, &FetchError::from(e));
                    }
                }
                continue;
            }

            match self.source.create(&key, &datum) {
                Ok(value) => {
                    debug!(cache = %self.store.name(), key = %key, "Tracking new key");
                    report.created += 1;
                    batch.created(key.clone(), value);
                    touched.push(key);
                }
                Err(e) => {
                    report.failed += 1;
                    log_refresh_failure(self.store.name(), &key, &FetchError::from(e));
                }
            }
        }

        batch.commit();
        report.version = self.store.version();

        if let Some(cascade) = &self.cascade {
            for key in touched {
                cascade.trigger(key);
            }
        }
        report
    }
}

#[async_trait]
impl<S: DataSource> Cache for PollingCache<S> {
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
        let active = match &self.active {
            Some(provider) => provider.active_keys().await.unwrap_or_else(|e| {
                warn!(cache = %self.store.name(), error = %e, "Failed to load active keys, using none");
                HashSet::new()
            }),
            None => self.store.keys().into_iter().collect(),
        };
        self.refresh_all(&active).await
    }
}
