//! The Blue Alliance integration for DevilScout.
//!
//! [`TbaClient`] talks to the upstream API; the cache modules turn its raw
//! payloads into the values the server hands out:
//!
//! | cache | kind | value |
//! |---|---|---|
//! | [`EventCache`] | on demand | [`EventInfo`] |
//! | [`RosterCache`] | polling | [`Roster`] |
//! | [`MatchScheduleCache`] | polling, cascades into OPRs | [`MatchSchedule`] |
//! | [`RankingsCache`] | polling | [`EventRanking`] |
//! | [`OprsCache`] | on demand | [`EventOprTable`] |

pub mod client;
pub mod error;
pub mod events;
pub mod match_key;
pub mod model;
pub mod oprs;
pub mod rankings;
pub mod roster;
pub mod schedule;
pub mod season;

pub use client::{DEFAULT_BASE_URL, TbaClient, TbaClientConfig};
pub use error::TbaError;
pub use events::{EventCache, EventInfo, event_cache};
pub use match_key::{MatchKey, MatchLevel, compare_match_keys};
pub use oprs::{EventOprTable, OprsCache, TeamOpr, oprs_cache};
pub use rankings::{EventRanking, RankingsCache, TeamRanking, rankings_cache};
pub use roster::{Roster, RosterCache, TeamInfo, roster_cache};
pub use schedule::{MatchInfo, MatchSchedule, MatchScheduleCache, match_schedule_cache};
pub use season::{MatchRecord, ScoreBreakdown, Season};
