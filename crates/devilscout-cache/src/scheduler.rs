//! Fixed-rate refresh loops.
//!
//! Each registered cache gets its own background task ticking at its own
//! period, so a slow upstream for one cache never delays another. Ticks missed
//! while a refresh is still running are skipped rather than bunched up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::store::{Cache, RefreshReport};

pub struct RefreshScheduler {
    jobs: Vec<(Arc<dyn Cache>, Duration)>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Refresh `cache` every `period`, starting immediately.
    pub fn schedule(mut self, cache: Arc<dyn Cache>, period: Duration) -> Self {
        self.jobs.push((cache, period));
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Spawn one loop per scheduled cache.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .jobs
            .into_iter()
            .map(|(cache, period)| {
                info!(cache = %cache.name(), period_secs = period.as_secs_f64(), "Scheduling cache refresh");
                tokio::spawn(run_loop(cache, period, shutdown_rx.clone()))
            })
            .collect();

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Running refresh loops.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every loop after its current cycle and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Refresh loop ended abnormally");
            }
        }
        info!("Refresh scheduler stopped");
    }
}

/// Run a single refresh cycle and log its outcome.
pub async fn refresh_once(cache: &dyn Cache) -> RefreshReport {
    let started = Instant::now();
    let report = cache.refresh().await;
    info!(
        cache = %cache.name(),
        size = cache.size(),
        version = report.version,
        created = report.created,
        changed = report.changed,
        evicted = report.evicted,
        failed = report.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Refreshed cache"
    );
    report
}

async fn run_loop(cache: Arc<dyn Cache>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh_once(cache.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(cache = %cache.name(), "Refresh loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct Counting {
        name: &'static str,
        runs: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Cache for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn size(&self) -> usize {
            0
        }

        fn version(&self) -> u64 {
            0
        }

        async fn refresh(&self) -> RefreshReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            RefreshReport::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_cache_runs_at_its_own_period() {
        let fast = Counting::new("fast");
        let slow = Counting::new("slow");
        let handle = RefreshScheduler::new()
            .schedule(fast.clone(), Duration::from_secs(60))
            .schedule(slow.clone(), Duration::from_secs(3600))
            .start();

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fast.runs(), 1);
        assert_eq!(slow.runs(), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fast.runs(), 6);
        assert_eq!(slow.runs(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loops() {
        let cache = Counting::new("notes");
        let handle = RefreshScheduler::new()
            .schedule(cache.clone(), Duration::from_secs(60))
            .start();
        tokio::time::sleep(Duration::from_millis(1)).await;

        handle.shutdown().await;
        let runs = cache.runs();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(cache.runs(), runs);
    }

    #[tokio::test]
    async fn test_refresh_once_returns_report() {
        let cache = Counting::new("notes");
        let report = refresh_once(cache.as_ref()).await;

        assert_eq!(report, RefreshReport::default());
        assert_eq!(cache.runs(), 1);
    }
}
