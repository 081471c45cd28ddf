//! Bounded pool for upstream calls.
//!
//! Every cache shares one [`FetchPool`]. A semaphore caps the number of
//! in-flight requests; further fetches wait for a permit instead of opening more
//! connections. Each fetch runs in its own task under a timeout, so a hung or
//! panicking request only fails its own key.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::{FetchError, FetchResult};

#[derive(Debug, Clone)]
pub struct FetchPool {
    permits: Arc<Semaphore>,
    size: usize,
    timeout: Duration,
}

impl FetchPool {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize, timeout: Duration) -> Self {
        assert!(size > 0, "fetch pool needs at least one permit");
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Permits not currently held by a running fetch.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one upstream call inside the pool.
    pub async fn run<T, F>(&self, fetch: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;
        trace!(available = self.permits.available_permits(), "Acquired fetch permit");

        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            let _permit = permit;
            tokio::time::timeout(timeout, fetch)
                .await
                .unwrap_or(Err(FetchError::Timeout(timeout)))
        });

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(FetchError::Panicked(panic_message(err.into_panic()))),
            Err(_) => Err(FetchError::upstream("fetch task was cancelled")),
        }
    }

    /// Reject all queued and future fetches.
    pub fn close(&self) {
        self.permits.close();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
