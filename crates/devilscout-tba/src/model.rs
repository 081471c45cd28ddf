//! Raw payloads of The Blue Alliance API v3.
//!
//! These mirror the upstream JSON and are only ever read. Cached values are
//! derived from them in the cache modules.

use std::collections::HashMap;

use serde::Deserialize;

use devilscout_cache::MalformedDatum;

/// `/event/{event_key}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_prov: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
    pub year: i32,
    /// Zero-based competition week; absent for offseason and championship
    #[serde(default)]
    pub week: Option<u8>,
}

/// One entry of `/event/{event_key}/teams/simple`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Team {
    pub key: String,
    pub team_number: u32,
    #[serde(default)]
    pub nickname: Option<String>,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_prov: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// One entry of `/event/{event_key}/matches`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Match {
    pub key: String,
    pub comp_level: String,
    pub set_number: u32,
    pub match_number: u32,
    pub alliances: Alliances<MatchAlliance>,
    /// `"red"`, `"blue"`, or empty when undecided or tied
    #[serde(default)]
    pub winning_alliance: Option<String>,
    /// Scheduled start, Unix seconds
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub predicted_time: Option<i64>,
    #[serde(default)]
    pub actual_time: Option<i64>,
    /// Season-specific; decoded by [`Season`](crate::Season)
    #[serde(default)]
    pub score_breakdown: Option<Alliances<serde_json::Value>>,
}

impl Match {
    /// Whether the match has been played.
    pub fn is_complete(&self) -> bool {
        self.actual_time.is_some()
            || self
                .winning_alliance
                .as_deref()
                .is_some_and(|winner| !winner.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alliances<T> {
    pub red: T,
    pub blue: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchAlliance {
    /// `-1` until the match is scored
    pub score: i32,
    pub team_keys: Vec<String>,
}

/// `/event/{event_key}/rankings`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRankings {
    pub rankings: Vec<Ranking>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ranking {
    pub team_key: String,
    pub rank: u32,
    #[serde(default)]
    pub matches_played: u32,
    #[serde(default)]
    pub dq: u32,
    #[serde(default)]
    pub record: Option<Record>,
    /// First entry is the ranking score
    #[serde(default)]
    pub sort_orders: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Record {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

/// `/event/{event_key}/oprs`, keyed by team key
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventOprs {
    #[serde(default)]
    pub oprs: HashMap<String, f64>,
    #[serde(default)]
    pub dprs: HashMap<String, f64>,
    #[serde(default)]
    pub ccwms: HashMap<String, f64>,
}

/// Parse a `frcNNNN` team key into its team number.
pub fn parse_team_key(key: &str) -> Result<u32, MalformedDatum> {
    key.strip_prefix("frc")
        .and_then(|number| number.parse().ok())
        .ok_or_else(|| MalformedDatum::new(format!("invalid team key '{key}'")))
}

/// `City, State, Country`, skipping missing parts.
pub(crate) fn format_location(
    city: &Option<String>,
    state_prov: &Option<String>,
    country: &Option<String>,
) -> String {
    [city, state_prov, country]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Store `next` in `slot`, returning whether it differed.
pub(crate) fn replace<T: PartialEq>(slot: &mut T, next: T) -> bool {
    if *slot == next {
        return false;
    }
    *slot = next;
    true
}
