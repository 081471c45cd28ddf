//! The explicit cache context.
//!
//! Every cache is built once at startup from [`AppConfig`] and handed to
//! consumers through [`CacheContext`]; there are no global registries. All
//! caches share one [`FetchPool`], so the upstream concurrency limit is global.

use std::sync::Arc;
use std::time::Duration;

use devilscout_cache::{ActiveKeys, Cache, Cascade, FetchPool, RefreshScheduler};
use devilscout_tba::{
    EventCache, MatchScheduleCache, OprsCache, RankingsCache, RosterCache, Season, TbaClient,
    TbaError, event_cache, match_schedule_cache, oprs_cache, rankings_cache, roster_cache,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;

/// How long shutdown waits for queued dependent refreshes to drain.
const CASCADE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("unsupported season {0}")]
    UnsupportedSeason(u16),

    #[error(transparent)]
    Tba(#[from] TbaError),
}

pub struct CacheContext {
    pub season: Season,
    pub client: Arc<TbaClient>,
    pub pool: FetchPool,
    pub events: Arc<EventCache>,
    pub rosters: Arc<RosterCache>,
    pub schedules: Arc<MatchScheduleCache>,
    pub rankings: Arc<RankingsCache>,
    pub oprs: Arc<OprsCache>,
    config: AppConfig,
    cascade_worker: JoinHandle<()>,
}

impl CacheContext {
    /// Build every cache. Must run inside a tokio runtime, since it spawns the
    /// worker that feeds schedule changes into the OPR cache.
    pub fn build(
        config: &AppConfig,
        active: Arc<dyn ActiveKeys<String>>,
    ) -> Result<Self, ContextError> {
        let season = config
            .season()
            .ok_or(ContextError::UnsupportedSeason(config.season))?;
        let client = Arc::new(TbaClient::new(config.tba_client_config())?);
        let pool = FetchPool::new(config.tba.max_concurrent_requests, config.request_timeout());
        let purge_ttl = config.cache.purge_ttl();

        let events = Arc::new(event_cache(Arc::clone(&client), pool.clone(), purge_ttl));
        let oprs = Arc::new(oprs_cache(Arc::clone(&client), pool.clone(), purge_ttl));
        let (cascade, cascade_worker) = Cascade::spawn(Arc::clone(&oprs));

        let rosters = Arc::new(roster_cache(
            Arc::clone(&client),
            pool.clone(),
            Arc::clone(&active),
        ));
        let schedules = Arc::new(match_schedule_cache(
            Arc::clone(&client),
            season,
            pool.clone(),
            Arc::clone(&active),
            cascade,
        ));
        let rankings = Arc::new(rankings_cache(Arc::clone(&client), pool.clone(), active));

        info!(
            season = season.year(),
            base_url = %client.base_url(),
            pool_size = pool.size(),
            "Cache context built"
        );

        Ok(Self {
            season,
            client,
            pool,
            events,
            rosters,
            schedules,
            rankings,
            oprs,
            config: config.clone(),
            cascade_worker,
        })
    }

    /// A scheduler with every cache at its configured period.
    pub fn scheduler(&self) -> RefreshScheduler {
        let periods = &self.config.cache;
        RefreshScheduler::new()
            .schedule(self.events.clone(), periods.event_refresh())
            .schedule(self.rosters.clone(), periods.roster_refresh())
            .schedule(self.schedules.clone(), periods.schedule_refresh())
            .schedule(self.rankings.clone(), periods.rankings_refresh())
            .schedule(self.oprs.clone(), periods.oprs_refresh())
    }

    pub fn caches(&self) -> [Arc<dyn Cache>; 5] {
        [
            self.events.clone(),
            self.rosters.clone(),
            self.schedules.clone(),
            self.rankings.clone(),
            self.oprs.clone(),
        ]
    }

    /// Drop the caches, let queued OPR refreshes finish, then close the fetch
    /// pool so nothing else reaches the upstream.
    ///
    /// Call after the scheduler has stopped; the worker only ends once the
    /// schedule cache, and with it the trigger side of the cascade, is gone.
    pub async fn shutdown(self) {
        let Self {
            schedules,
            cascade_worker,
            pool,
            ..
        } = self;
        drop(schedules);

        let abort = cascade_worker.abort_handle();
        match tokio::time::timeout(CASCADE_DRAIN_TIMEOUT, cascade_worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Cascade worker ended abnormally"),
            Err(_) => {
                warn!("Cascade worker still busy at shutdown, aborting");
                abort.abort();
            }
        }

        pool.close();
        info!("Fetch pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::StaticActiveEvents;

    fn active() -> Arc<dyn ActiveKeys<String>> {
        Arc::new(StaticActiveEvents::new(["2024miket"]))
    }

    #[tokio::test]
    async fn test_build_wires_every_cache() {
        let ctx = CacheContext::build(&AppConfig::default(), active()).unwrap();

        let names: Vec<String> = ctx.caches().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["events", "rosters", "match_schedules", "rankings", "oprs"]
        );
        assert!(ctx.caches().iter().all(|c| c.size() == 0 && c.version() == 0));
        assert_eq!(ctx.scheduler().len(), 5);
        assert_eq!(ctx.pool.size(), 16);
        assert_eq!(ctx.season, Season::Crescendo2024);

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_the_fetch_pool() {
        let ctx = CacheContext::build(&AppConfig::default(), active()).unwrap();
        let pool = ctx.pool.clone();

        ctx.shutdown().await;

        let err = pool.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, devilscout_cache::FetchError::PoolClosed));
    }

    #[tokio::test]
    async fn test_unsupported_season_is_an_error() {
        let config = AppConfig {
            season: 2015,
            ..AppConfig::default()
        };

        let err = CacheContext::build(&config, active()).err().unwrap();
        assert!(matches!(err, ContextError::UnsupportedSeason(2015)));
    }

    #[tokio::test]
    async fn test_bad_base_url_is_an_error() {
        let mut config = AppConfig::default();
        config.tba.base_url = "mailto:scouts@example.org".into();

        let err = CacheContext::build(&config, active()).err().unwrap();
        assert!(matches!(err, ContextError::Tba(TbaError::InvalidBaseUrl { .. })));
    }
}
