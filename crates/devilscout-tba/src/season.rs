//! Per-season score breakdown decoding.
//!
//! The shape of a match's `score_breakdown` changes every season. The server
//! picks one [`Season`] at startup and every fetched match is decoded through
//! it, so the caches only ever see the typed [`ScoreBreakdown`].

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use devilscout_cache::MalformedDatum;

use crate::model::{Alliances, Match};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    ChargedUp2023,
    Crescendo2024,
}

impl Season {
    pub const SUPPORTED: [Season; 2] = [Season::ChargedUp2023, Season::Crescendo2024];

    pub fn from_year(year: u16) -> Option<Self> {
        match year {
            2023 => Some(Self::ChargedUp2023),
            2024 => Some(Self::Crescendo2024),
            _ => None,
        }
    }

    pub fn year(self) -> u16 {
        match self {
            Self::ChargedUp2023 => 2023,
            Self::Crescendo2024 => 2024,
        }
    }

    /// Decode one alliance's raw breakdown.
    pub fn decode_breakdown(self, raw: &serde_json::Value) -> Result<ScoreBreakdown, MalformedDatum> {
        match self {
            Self::ChargedUp2023 => decode(raw).map(ScoreBreakdown::ChargedUp),
            Self::Crescendo2024 => decode(raw).map(ScoreBreakdown::Crescendo),
        }
    }

    /// Attach decoded breakdowns to a raw match.
    pub fn decode_match(self, raw: Match) -> Result<MatchRecord, MalformedDatum> {
        let breakdown = match &raw.score_breakdown {
            Some(Alliances { red, blue }) if !red.is_null() && !blue.is_null() => Some(Alliances {
                red: self.decode_breakdown(red)?,
                blue: self.decode_breakdown(blue)?,
            }),
            _ => None,
        };
        Ok(MatchRecord { raw, breakdown })
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChargedUp2023 => write!(f, "2023 Charged Up"),
            Self::Crescendo2024 => write!(f, "2024 Crescendo"),
        }
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .ok()
            .and_then(Self::from_year)
            .ok_or_else(|| format!("unsupported season '{s}'"))
    }
}

fn decode<T: DeserializeOwned>(raw: &serde_json::Value) -> Result<T, MalformedDatum> {
    T::deserialize(raw).map_err(|e| MalformedDatum::new(format!("score breakdown: {e}")))
}

/// A match with its score breakdown decoded for the configured season.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub raw: Match,
    pub breakdown: Option<Alliances<ScoreBreakdown>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "season", rename_all = "snake_case")]
pub enum ScoreBreakdown {
    ChargedUp(ChargedUpBreakdown),
    Crescendo(CrescendoBreakdown),
}

impl ScoreBreakdown {
    pub fn total_points(&self) -> i32 {
        match self {
            Self::ChargedUp(b) => b.total_points,
            Self::Crescendo(b) => b.total_points,
        }
    }

    pub fn ranking_points(&self) -> i32 {
        match self {
            Self::ChargedUp(b) => b.rp,
            Self::Crescendo(b) => b.rp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct ChargedUpBreakdown {
    pub auto_points: i32,
    pub teleop_points: i32,
    pub foul_points: i32,
    pub total_points: i32,
    #[serde(default)]
    pub auto_charge_station_points: i32,
    #[serde(default)]
    pub end_game_charge_station_points: i32,
    #[serde(default)]
    pub link_points: i32,
    #[serde(default)]
    pub activation_bonus_achieved: bool,
    #[serde(default)]
    pub sustainability_bonus_achieved: bool,
    #[serde(default)]
    pub rp: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct CrescendoBreakdown {
    pub auto_points: i32,
    pub teleop_points: i32,
    pub foul_points: i32,
    pub total_points: i32,
    #[serde(default)]
    pub auto_leave_points: i32,
    #[serde(default)]
    pub auto_speaker_note_points: i32,
    #[serde(default)]
    pub auto_amp_note_points: i32,
    #[serde(default)]
    pub teleop_speaker_note_points: i32,
    #[serde(default)]
    pub teleop_speaker_note_amplified_points: i32,
    #[serde(default)]
    pub teleop_amp_note_points: i32,
    #[serde(default)]
    pub end_game_total_stage_points: i32,
    #[serde(default)]
    pub melody_bonus_achieved: bool,
    #[serde(default)]
    pub ensemble_bonus_achieved: bool,
    #[serde(default)]
    pub coopertition_criteria_met: bool,
    #[serde(default)]
    pub rp: i32,
}
