//! Keyed cell storage shared by every cache kind.
//!
//! [`CacheStore`] owns the key→cell map and the per-cache version counter. The
//! counter advances once per refresh cycle that changed anything, which makes it
//! usable as an ETag surrogate: equal versions imply identical content.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::cell::{PendingUpdate, VersionedCell};

/// A cache driven by the refresh scheduler.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// Number of tracked keys
    fn size(&self) -> usize;

    /// Global version; advances once per refresh cycle with changes
    fn version(&self) -> u64;

    /// Run one refresh cycle.
    ///
    /// Safe against concurrent reads, but callers must not run two cycles of
    /// the same cache at once.
    async fn refresh(&self) -> RefreshReport;
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Keys fetched this cycle
    pub refreshed: usize,
    pub created: usize,
    pub changed: usize,
    pub evicted: usize,
    /// Keys whose fetch or update failed; they keep their previous value
    pub failed: usize,
    /// Cache version after the cycle
    pub version: u64,
}

impl RefreshReport {
    pub fn has_changes(&self) -> bool {
        self.created + self.changed + self.evicted > 0
    }
}

/// A value read from a cache, with the version it was last changed at.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub version: u64,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            version: self.version,
        }
    }
}

impl<V> CacheEntry<V> {
    /// Strong entity tag for this entry.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.version)
    }

    /// Whether an `If-None-Match` header value matches this entry, in which
    /// case the caller can answer `304 Not Modified` without serializing.
    pub fn matches(&self, if_none_match: &str) -> bool {
        let etag = self.etag();
        if_none_match.split(',').map(str::trim).any(|candidate| {
            candidate == "*"
                || candidate == etag
                || candidate.strip_prefix("W/") == Some(etag.as_str())
        })
    }
}

/// Key→cell map plus the global version counter of one cache.
pub struct CacheStore<K, V> {
    name: Arc<str>,
    cells: DashMap<K, Arc<VersionedCell<V>>>,
    version: AtomicU64,
}

impl<K, V> CacheStore<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            cells: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.cells.contains_key(key)
    }

    /// Read a value, counting it as an access.
    ///
    /// Value and version come from one snapshot of the cell.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let snapshot = self.cell(key)?.read();
        Some(CacheEntry {
            value: Arc::clone(snapshot.value()),
            version: snapshot.version(),
        })
    }

    /// The cell for `key`, without counting as an access.
    pub fn cell(&self, key: &K) -> Option<Arc<VersionedCell<V>>> {
        self.cells.get(key).map(|cell| Arc::clone(cell.value()))
    }

    pub fn keys(&self) -> Vec<K> {
        self.cells.iter().map(|cell| cell.key().clone()).collect()
    }

    /// Point-in-time copy of the map, so callers never await under a shard lock.
    pub fn snapshot(&self) -> Vec<(K, Arc<VersionedCell<V>>)> {
        self.cells
            .iter()
            .map(|cell| (cell.key().clone(), Arc::clone(cell.value())))
            .collect()
    }

    /// Insert a cell unless one already exists.
    ///
    /// `make` runs only when the key is vacant, under the map's shard lock, so
    /// concurrent callers for one key create exactly one cell. Returns the cell
    /// now stored and whether this call created it.
    pub(crate) fn insert_with(
        &self,
        key: K,
        make: impl FnOnce() -> VersionedCell<V>,
    ) -> (Arc<VersionedCell<V>>, bool) {
        match self.cells.entry(key) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(vacant) => {
                let cell = Arc::new(make());
                vacant.insert(Arc::clone(&cell));
                (cell, true)
            }
        }
    }

    pub(crate) fn remove(&self, key: &K) -> bool {
        self.cells.remove(key).is_some()
    }

    /// Remove `key` if `predicate` still holds under the shard lock.
    pub(crate) fn remove_if(
        &self,
        key: &K,
        predicate: impl FnOnce(&VersionedCell<V>) -> bool,
    ) -> bool {
        self.cells
            .remove_if(key, |_, cell| predicate(cell))
            .is_some()
    }

    /// Advance the global version and return the new value.
    pub(crate) fn modified(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Start collecting the changes of one refresh cycle.
    pub(crate) fn batch(&self) -> ModificationBatch<'_, K, V> {
        ModificationBatch {
            store: self,
            changed: Vec::new(),
            created: Vec::new(),
            removed: 0,
        }
    }
}

impl<K: Eq + Hash, V> fmt::Debug for CacheStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("size", &self.cells.len())
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish()
    }
}

/// Changes gathered during one refresh cycle.
///
/// Changed values stay hidden while the cycle's other fetches run.
/// [`commit`](Self::commit) advances the version at most once no matter how many
/// cells changed, then publishes changed and created values stamped with that
/// version.
pub(crate) struct ModificationBatch<'a, K, V> {
    store: &'a CacheStore<K, V>,
    changed: Vec<(Arc<VersionedCell<V>>, PendingUpdate<V>)>,
    created: Vec<(K, V)>,
    removed: usize,
}

impl<K, V> ModificationBatch<'_, K, V>
where
    K: Clone + Eq + Hash,
{
    /// Queue a changed value; it becomes visible to readers on commit.
    pub(crate) fn changed(&mut self, cell: Arc<VersionedCell<V>>, pending: PendingUpdate<V>) {
        self.changed.push((cell, pending));
    }

    /// Queue a new cell; it becomes visible to readers on commit.
    pub(crate) fn created(&mut self, key: K, value: V) {
        self.created.push((key, value));
    }

    pub(crate) fn removed(&mut self) {
        self.removed += 1;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.created.is_empty() && self.removed == 0
    }

    /// Returns the new version, or `None` if the cycle changed nothing.
    pub(crate) fn commit(self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }

        let version = self.store.modified();
        for (cell, pending) in self.changed {
            // a concurrent single-key refresh already published something newer
            cell.publish(pending, version);
        }
        for (key, value) in self.created {
            self.store
                .insert_with(key, || VersionedCell::new(value, version));
        }
        Some(version)
    }
}
