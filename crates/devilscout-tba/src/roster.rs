//! Team lists of active events.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use devilscout_cache::{
    ActiveKeys, Cacheable, DataSource, FetchPool, FetchResult, ListSpec, ListValue, MalformedDatum,
    PollingCache,
};

use crate::client::{TbaClient, teams_path};
use crate::model::{Team, format_location, replace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamInfo {
    pub number: u32,
    pub name: String,
    pub location: String,
}

impl TeamInfo {
    pub fn from_team(team: &Team) -> Self {
        let mut info = Self {
            number: team.team_number,
            name: String::new(),
            location: String::new(),
        };
        info.apply(team);
        info
    }

    fn apply(&mut self, team: &Team) -> bool {
        let name = team.nickname.clone().unwrap_or_else(|| team.name.clone());
        let location = format_location(&team.city, &team.state_prov, &team.country);

        replace(&mut self.name, name) | replace(&mut self.location, location)
    }
}

impl Cacheable<Team> for TeamInfo {
    fn update(&mut self, team: &Team) -> Result<bool, MalformedDatum> {
        Ok(self.apply(team))
    }

    fn same_key(&self, team: &Team) -> bool {
        self.number == team.team_number
    }
}

/// Teams ordered by number.
pub struct RosterOrder;

impl ListSpec for RosterOrder {
    type Key = u32;
    type Item = Team;
    type Entry = TeamInfo;

    fn key_of(team: &Team) -> u32 {
        team.team_number
    }

    fn create(_number: &u32, team: &Team) -> Result<TeamInfo, MalformedDatum> {
        Ok(TeamInfo::from_team(team))
    }

    fn compare(a: &u32, b: &u32) -> Ordering {
        a.cmp(b)
    }
}

pub type Roster = ListValue<RosterOrder>;

pub struct RosterSource {
    client: Arc<TbaClient>,
}

impl RosterSource {
    pub fn new(client: Arc<TbaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for RosterSource {
    type Key = String;
    type Datum = Vec<Team>;
    type Value = Roster;

    async fn fetch(&self, key: &String) -> FetchResult<Option<Vec<Team>>> {
        self.client.event_teams(key).await
    }

    fn create(&self, _key: &String, teams: &Vec<Team>) -> Result<Roster, MalformedDatum> {
        Roster::from_items(teams)
    }

    fn evicted(&self, key: &String) {
        self.client.forget(&teams_path(key));
    }
}

pub type RosterCache = PollingCache<RosterSource>;

pub fn roster_cache(
    client: Arc<TbaClient>,
    pool: FetchPool,
    active: Arc<dyn ActiveKeys<String>>,
) -> RosterCache {
    PollingCache::new("rosters", Arc::new(RosterSource::new(client)), pool).with_active_keys(active)
}
