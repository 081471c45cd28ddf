//! Match schedules of active events.
//!
//! The schedule of an event is an ordered collection of [`MatchInfo`], sorted
//! with [`compare_match_keys`]. Whenever a schedule is created or changes, the
//! cache triggers a refresh of the event's OPRs through its cascade.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use devilscout_cache::{
    ActiveKeys, Cacheable, Cascade, DataSource, FetchError, FetchPool, FetchResult, ListSpec,
    ListValue, MalformedDatum, PollingCache,
};

use crate::client::{TbaClient, matches_path};
use crate::match_key::{MatchKey, MatchLevel, compare_match_keys};
use crate::model::{Alliances, parse_team_key, replace};
use crate::season::{MatchRecord, ScoreBreakdown, Season};

/// One match within a schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchInfo {
    pub key: String,
    pub name: String,
    pub level: MatchLevel,
    pub set: Option<u32>,
    pub number: u32,
    pub red: Vec<u32>,
    pub blue: Vec<u32>,
    /// Actual start once played, predicted or scheduled start before; Unix
    /// seconds
    pub time: Option<i64>,
    pub completed: bool,
    pub red_breakdown: Option<ScoreBreakdown>,
    pub blue_breakdown: Option<ScoreBreakdown>,
}

impl MatchInfo {
    pub fn new(record: &MatchRecord) -> Result<Self, MalformedDatum> {
        let raw = &record.raw;
        let (level, set, number) = match MatchKey::parse(&raw.key) {
            Some(parsed) => (parsed.level, parsed.set, parsed.number),
            None => {
                let level = MatchLevel::from_code(&raw.comp_level).ok_or_else(|| {
                    MalformedDatum::new(format!(
                        "match {} has unknown level '{}'",
                        raw.key, raw.comp_level
                    ))
                })?;
                let set = (level != MatchLevel::Qualification).then_some(raw.set_number);
                (level, set, raw.match_number)
            }
        };
        let name = match set {
            Some(set) => format!("{level} {set}-{number}"),
            None => format!("{level} {number}"),
        };

        let mut info = Self {
            key: raw.key.clone(),
            name,
            level,
            set,
            number,
            red: Vec::new(),
            blue: Vec::new(),
            time: None,
            completed: false,
            red_breakdown: None,
            blue_breakdown: None,
        };
        info.update(record)?;
        Ok(info)
    }
}

impl Cacheable<MatchRecord> for MatchInfo {
    fn update(&mut self, record: &MatchRecord) -> Result<bool, MalformedDatum> {
        let raw = &record.raw;
        let red = parse_alliance(&raw.alliances.red.team_keys)?;
        let blue = parse_alliance(&raw.alliances.blue.team_keys)?;
        let completed = raw.is_complete();
        let time = if completed {
            raw.actual_time.or(raw.predicted_time).or(raw.time)
        } else {
            raw.predicted_time.or(raw.time)
        };
        let (red_breakdown, blue_breakdown) = match &record.breakdown {
            Some(Alliances { red, blue }) => (Some(red.clone()), Some(blue.clone())),
            None => (None, None),
        };

        let mut changed = false;
        changed |= replace(&mut self.red, red);
        changed |= replace(&mut self.blue, blue);
        changed |= replace(&mut self.completed, completed);
        changed |= replace(&mut self.time, time);
        changed |= replace(&mut self.red_breakdown, red_breakdown);
        changed |= replace(&mut self.blue_breakdown, blue_breakdown);
        Ok(changed)
    }

    fn same_key(&self, record: &MatchRecord) -> bool {
        self.key == record.raw.key
    }
}

fn parse_alliance(team_keys: &[String]) -> Result<Vec<u32>, MalformedDatum> {
    team_keys.iter().map(|key| parse_team_key(key)).collect()
}

/// Matches in play order.
pub struct ScheduleOrder;

impl ListSpec for ScheduleOrder {
    type Key = String;
    type Item = MatchRecord;
    type Entry = MatchInfo;

    fn key_of(record: &MatchRecord) -> String {
        record.raw.key.clone()
    }

    fn create(_key: &String, record: &MatchRecord) -> Result<MatchInfo, MalformedDatum> {
        MatchInfo::new(record)
    }

    fn compare(a: &String, b: &String) -> Ordering {
        compare_match_keys(a, b)
    }
}

pub type MatchSchedule = ListValue<ScheduleOrder>;

pub struct ScheduleSource {
    client: Arc<TbaClient>,
    season: Season,
}

impl ScheduleSource {
    pub fn new(client: Arc<TbaClient>, season: Season) -> Self {
        Self { client, season }
    }
}

#[async_trait]
impl DataSource for ScheduleSource {
    type Key = String;
    type Datum = Vec<MatchRecord>;
    type Value = MatchSchedule;

    async fn fetch(&self, key: &String) -> FetchResult<Option<Vec<MatchRecord>>> {
        let Some(matches) = self.client.event_matches(key).await? else {
            return Ok(None);
        };
        matches
            .into_iter()
            .map(|raw| self.season.decode_match(raw))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(FetchError::from)
    }

    fn create(&self, _key: &String, records: &Vec<MatchRecord>) -> Result<MatchSchedule, MalformedDatum> {
        MatchSchedule::from_items(records)
    }

    fn evicted(&self, key: &String) {
        self.client.forget(&matches_path(key));
    }
}

pub type MatchScheduleCache = PollingCache<ScheduleSource>;

/// Schedule cache for the active events, cascading into the OPR cache.
pub fn match_schedule_cache(
    client: Arc<TbaClient>,
    season: Season,
    pool: FetchPool,
    active: Arc<dyn ActiveKeys<String>>,
    oprs: Cascade<String>,
) -> MatchScheduleCache {
    PollingCache::new("match_schedules", Arc::new(ScheduleSource::new(client, season)), pool)
        .with_active_keys(active)
        .with_cascade(oprs)
}
