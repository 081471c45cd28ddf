//! One-way refresh triggers between caches.
//!
//! A cache that owns a [`Cascade`] pushes the key of every entry it created or
//! changed onto an unbounded channel. A worker task drains the channel and asks
//! the dependent cache to refresh that key. The triggering refresh never waits
//! on the dependent, and the dependent holds no handle back to its trigger.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FetchResult;
use crate::on_demand::OnDemandCache;
use crate::source::DataSource;

/// A cache that can recompute a single key on request.
#[async_trait]
pub trait DependentRefresh<K>: Send + Sync {
    fn cache_name(&self) -> &str;

    /// Returns whether the cached value for `key` changed.
    async fn refresh_dependent(&self, key: &K) -> FetchResult<bool>;
}

#[async_trait]
impl<S: DataSource> DependentRefresh<S::Key> for OnDemandCache<S> {
    fn cache_name(&self) -> &str {
        self.store().name()
    }

    async fn refresh_dependent(&self, key: &S::Key) -> FetchResult<bool> {
        self.refresh_key(key).await
    }
}

/// Sending half of a dependency edge.
pub struct Cascade<K> {
    sender: mpsc::UnboundedSender<K>,
    target: Arc<str>,
}

impl<K> Clone for Cascade<K> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            target: Arc::clone(&self.target),
        }
    }
}

impl<K> fmt::Debug for Cascade<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<K> Cascade<K>
where
    K: fmt::Display + Send + Sync + 'static,
{
    /// An edge whose triggers are delivered to the returned receiver.
    pub fn channel(target: impl Into<Arc<str>>) -> (Self, mpsc::UnboundedReceiver<K>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cascade = Self {
            sender,
            target: target.into(),
        };
        (cascade, receiver)
    }

    /// An edge drained by a worker task that refreshes `dependent`.
    ///
    /// The worker stops once every clone of the returned `Cascade` is dropped.
    pub fn spawn<D>(dependent: Arc<D>) -> (Self, JoinHandle<()>)
    where
        D: DependentRefresh<K> + 'static,
    {
        let (cascade, receiver) = Self::channel(dependent.cache_name());
        let worker = tokio::spawn(run_worker(dependent, receiver));
        (cascade, worker)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Queue a refresh of `key` in the dependent cache. Never blocks.
    pub fn trigger(&self, key: K) {
        debug!(target_cache = %self.target, key = %key, "Triggering dependent refresh");
        if let Err(mpsc::error::SendError(key)) = self.sender.send(key) {
            warn!(target_cache = %self.target, key = %key, "Dependent refresh worker is gone, dropping trigger");
        }
    }
}

async fn run_worker<K, D>(dependent: Arc<D>, mut receiver: mpsc::UnboundedReceiver<K>)
where
    K: fmt::Display + Send + Sync + 'static,
    D: DependentRefresh<K> + 'static,
{
    while let Some(key) = receiver.recv().await {
        match dependent.refresh_dependent(&key).await {
            Ok(changed) => {
                debug!(cache = %dependent.cache_name(), key = %key, changed, "Dependent refresh finished")
            }
            Err(e) => {
                warn!(cache = %dependent.cache_name(), key = %key, error = %e, "Dependent refresh failed")
            }
        }
    }
    debug!(cache = %dependent.cache_name(), "Dependent refresh worker stopped");
}
