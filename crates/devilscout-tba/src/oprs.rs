//! Offensive power ratings per event.
//!
//! OPRs are derived from completed match scores, so besides the regular idle
//! refresh the cache recomputes an event whenever its match schedule changes.
//! That trigger arrives through a [`Cascade`](devilscout_cache::Cascade); this
//! cache never reads the schedule cache itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use devilscout_cache::{Cacheable, DataSource, FetchPool, FetchResult, MalformedDatum, OnDemandCache};

use crate::client::{TbaClient, oprs_path};
use crate::model::{EventOprs, parse_team_key, replace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TeamOpr {
    pub opr: f64,
    pub dpr: f64,
    pub ccwm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventOprTable {
    pub teams: BTreeMap<u32, TeamOpr>,
}

impl EventOprTable {
    pub fn team(&self, number: u32) -> Option<TeamOpr> {
        self.teams.get(&number).copied()
    }

    fn build(raw: &EventOprs) -> Result<BTreeMap<u32, TeamOpr>, MalformedDatum> {
        let mut teams: BTreeMap<u32, TeamOpr> = BTreeMap::new();
        for (key, opr) in &raw.oprs {
            teams.entry(parse_team_key(key)?).or_default().opr = *opr;
        }
        for (key, dpr) in &raw.dprs {
            teams.entry(parse_team_key(key)?).or_default().dpr = *dpr;
        }
        for (key, ccwm) in &raw.ccwms {
            teams.entry(parse_team_key(key)?).or_default().ccwm = *ccwm;
        }
        Ok(teams)
    }
}

impl Cacheable<EventOprs> for EventOprTable {
    fn update(&mut self, raw: &EventOprs) -> Result<bool, MalformedDatum> {
        let teams = Self::build(raw)?;
        Ok(replace(&mut self.teams, teams))
    }
}

pub struct OprsSource {
    client: Arc<TbaClient>,
}

impl OprsSource {
    pub fn new(client: Arc<TbaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for OprsSource {
    type Key = String;
    type Datum = EventOprs;
    type Value = EventOprTable;

    async fn fetch(&self, key: &String) -> FetchResult<Option<EventOprs>> {
        self.client.event_oprs(key).await
    }

    fn create(&self, _key: &String, raw: &EventOprs) -> Result<EventOprTable, MalformedDatum> {
        Ok(EventOprTable {
            teams: EventOprTable::build(raw)?,
        })
    }

    fn evicted(&self, key: &String) {
        self.client.forget(&oprs_path(key));
    }
}

pub type OprsCache = OnDemandCache<OprsSource>;

pub fn oprs_cache(client: Arc<TbaClient>, pool: FetchPool, purge_ttl: Duration) -> OprsCache {
    OnDemandCache::new("oprs", Arc::new(OprsSource::new(client)), pool, purge_ttl)
}
