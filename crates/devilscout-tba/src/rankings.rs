//! Qualification rankings of active events.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use devilscout_cache::{
    ActiveKeys, Cacheable, DataSource, FetchError, FetchPool, FetchResult, ListSpec, ListValue,
    MalformedDatum, PollingCache,
};

use crate::client::{TbaClient, rankings_path};
use crate::model::{Ranking, parse_team_key, replace};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRanking {
    pub team: u32,
    pub rank: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub matches_played: u32,
    pub disqualifications: u32,
    pub ranking_score: Option<f64>,
}

impl TeamRanking {
    pub fn new(team: u32, ranking: &Ranking) -> Self {
        let mut entry = Self {
            team,
            rank: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            matches_played: 0,
            disqualifications: 0,
            ranking_score: None,
        };
        entry.apply(ranking);
        entry
    }

    fn apply(&mut self, ranking: &Ranking) -> bool {
        let (wins, losses, ties) = ranking
            .record
            .map(|record| (record.wins, record.losses, record.ties))
            .unwrap_or_default();
        let ranking_score = ranking
            .sort_orders
            .as_ref()
            .and_then(|orders| orders.first().copied());

        let mut changed = false;
        changed |= replace(&mut self.rank, ranking.rank);
        changed |= replace(&mut self.wins, wins);
        changed |= replace(&mut self.losses, losses);
        changed |= replace(&mut self.ties, ties);
        changed |= replace(&mut self.matches_played, ranking.matches_played);
        changed |= replace(&mut self.disqualifications, ranking.dq);
        changed |= replace(&mut self.ranking_score, ranking_score);
        changed
    }
}

/// A ranking row with its team key already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    pub team: u32,
    pub ranking: Ranking,
}

impl RankingRow {
    pub fn parse(ranking: Ranking) -> Result<Self, MalformedDatum> {
        Ok(Self {
            team: parse_team_key(&ranking.team_key)?,
            ranking,
        })
    }
}

impl Cacheable<RankingRow> for TeamRanking {
    fn update(&mut self, row: &RankingRow) -> Result<bool, MalformedDatum> {
        Ok(self.apply(&row.ranking))
    }

    fn same_key(&self, row: &RankingRow) -> bool {
        self.team == row.team
    }
}

/// Rankings ordered by team number.
pub struct RankingOrder;

impl ListSpec for RankingOrder {
    type Key = u32;
    type Item = RankingRow;
    type Entry = TeamRanking;

    fn key_of(row: &RankingRow) -> u32 {
        row.team
    }

    fn create(team: &u32, row: &RankingRow) -> Result<TeamRanking, MalformedDatum> {
        Ok(TeamRanking::new(*team, &row.ranking))
    }

    fn compare(a: &u32, b: &u32) -> Ordering {
        a.cmp(b)
    }
}

pub type EventRanking = ListValue<RankingOrder>;

/// Entries sorted by rank instead of team number.
pub fn by_rank(ranking: &EventRanking) -> Vec<&TeamRanking> {
    let mut entries: Vec<_> = ranking.values().collect();
    entries.sort_by_key(|entry| entry.rank);
    entries
}

pub struct RankingsSource {
    client: Arc<TbaClient>,
}

impl RankingsSource {
    pub fn new(client: Arc<TbaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for RankingsSource {
    type Key = String;
    type Datum = Vec<RankingRow>;
    type Value = EventRanking;

    async fn fetch(&self, key: &String) -> FetchResult<Option<Vec<RankingRow>>> {
        let Some(rankings) = self.client.event_rankings(key).await? else {
            return Ok(None);
        };
        rankings
            .rankings
            .into_iter()
            .map(RankingRow::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(FetchError::from)
    }

    fn create(&self, _key: &String, rows: &Vec<RankingRow>) -> Result<EventRanking, MalformedDatum> {
        EventRanking::from_items(rows)
    }

    fn evicted(&self, key: &String) {
        self.client.forget(&rankings_path(key));
    }
}

pub type RankingsCache = PollingCache<RankingsSource>;

pub fn rankings_cache(
    client: Arc<TbaClient>,
    pool: FetchPool,
    active: Arc<dyn ActiveKeys<String>>,
) -> RankingsCache {
    PollingCache::new("rankings", Arc::new(RankingsSource::new(client)), pool).with_active_keys(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    fn row(team: u32, rank: u32, wins: u32) -> RankingRow {
        RankingRow::parse(Ranking {
            team_key: format!("frc{team}"),
            rank,
            matches_played: 10,
            dq: 0,
            record: Some(Record {
                wins,
                losses: 10 - wins,
                ties: 0,
            }),
            sort_orders: Some(vec![2.5, 40.0]),
        })
        .unwrap()
    }

    #[test]
    fn test_rankings_keyed_by_team_and_sortable_by_rank() {
        let ranking = EventRanking::from_items(&[row(1559, 2, 8), row(254, 1, 10), row(9999, 3, 5)])
            .unwrap();

        let teams: Vec<u32> = ranking.keys().copied().collect();
        assert_eq!(teams, vec![254, 1559, 9999]);

        let ranked: Vec<u32> = by_rank(&ranking).iter().map(|entry| entry.team).collect();
        assert_eq!(ranked, vec![254, 1559, 9999]);
        assert_eq!(ranking.get(&1559).unwrap().ranking_score, Some(2.5));
    }

    #[test]
    fn test_rank_swap_changes_both_entries() {
        let mut ranking = EventRanking::from_items(&[row(1559, 1, 8), row(254, 2, 8)]).unwrap();

        assert!(ranking.apply(&[row(1559, 2, 8), row(254, 1, 9)]).unwrap());
        assert_eq!(ranking.get(&254).unwrap().rank, 1);
        assert_eq!(ranking.get(&254).unwrap().wins, 9);
        assert!(!ranking.apply(&[row(1559, 2, 8), row(254, 1, 9)]).unwrap());
    }

    #[test]
    fn test_bad_team_key_is_malformed() {
        let mut broken = row(1559, 1, 1).ranking;
        broken.team_key = "1559".to_string();
        assert!(RankingRow::parse(broken).is_err());
    }
}
