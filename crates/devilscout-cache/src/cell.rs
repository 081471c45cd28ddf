//! Versioned value cells.
//!
//! A [`VersionedCell`] holds one derived value and the version it changed at
//! behind an [`ArcSwap`]. Updates are applied to a private copy
//! ([`VersionedCell::prepare`]) and later published together with their new
//! version in a single pointer swap ([`VersionedCell::publish`]), so a
//! concurrent reader sees either the previous pair or the updated one.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::MalformedDatum;

/// A value derived from a raw external datum `D`.
pub trait Cacheable<D>: Clone + Send + Sync + 'static {
    /// Apply a fresh datum, returning whether anything observable changed.
    ///
    /// On error the receiver may be left half-updated; callers only ever run
    /// this on a private copy and drop it on failure.
    fn update(&mut self, data: &D) -> Result<bool, MalformedDatum>;

    /// Whether `data` describes the same entity as `self`.
    ///
    /// Values whose datum carries no identity of its own keep the default.
    fn same_key(&self, _data: &D) -> bool {
        true
    }
}

/// A value together with the cache version it was published at.
///
/// Both halves are swapped in as one pointer, so a reader can never pair a new
/// value with an old version or the other way round.
#[derive(Debug)]
pub struct Snapshot<V> {
    value: Arc<V>,
    version: u64,
}

impl<V> Snapshot<V> {
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// A changed value built from one snapshot of a cell, not yet visible to
/// readers.
pub struct PendingUpdate<V> {
    base: Arc<Snapshot<V>>,
    next: V,
}

impl<V> PendingUpdate<V> {
    pub fn value(&self) -> &V {
        &self.next
    }
}

/// One cached value plus its change and access metadata.
pub struct VersionedCell<V> {
    current: ArcSwap<Snapshot<V>>,
    last_access: Mutex<Instant>,
}

impl<V> VersionedCell<V> {
    pub fn new(value: V, version: u64) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                value: Arc::new(value),
                version,
            }),
            last_access: Mutex::new(Instant::now()),
        }
    }

    /// Current value and version; extends the idle deadline.
    pub fn read(&self) -> Arc<Snapshot<V>> {
        self.touch();
        self.current.load_full()
    }

    /// Current value and version without counting as an access.
    pub fn snapshot(&self) -> Arc<Snapshot<V>> {
        self.current.load_full()
    }

    /// Current value without counting as an access.
    pub fn peek(&self) -> Arc<V> {
        Arc::clone(&self.current.load().value)
    }

    /// Cache version at the last published change.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    /// How long the cell has gone unread as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    /// Build the value `data` would produce, without publishing it.
    ///
    /// Returns `None` when nothing observable would change.
    ///
    /// # Panics
    ///
    /// Panics if `data` belongs to a different entity than the cell holds.
    pub fn prepare<D>(&self, data: &D) -> Result<Option<PendingUpdate<V>>, MalformedDatum>
    where
        V: Cacheable<D>,
    {
        let base = self.current.load_full();
        assert!(
            base.value.same_key(data),
            "datum does not belong to the entity held by this cell"
        );

        let mut next = V::clone(&base.value);
        if !next.update(data)? {
            return Ok(None);
        }
        Ok(Some(PendingUpdate { base, next }))
    }

    /// Make a prepared value visible, stamped with `version`.
    ///
    /// Fails, and drops `pending`, if another update was published after
    /// `pending` was prepared; the newer value stays.
    pub fn publish(&self, pending: PendingUpdate<V>, version: u64) -> bool {
        let PendingUpdate { base, next } = pending;
        let next = Arc::new(Snapshot {
            value: Arc::new(next),
            version: version.max(base.version),
        });
        let previous = self.current.compare_and_swap(&base, next);
        Arc::ptr_eq(&*previous, &base)
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for VersionedCell<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("VersionedCell")
            .field("value", &current.value)
            .field("version", &current.version)
            .finish()
    }
}
