//! Match key parsing and ordering.
//!
//! Blue Alliance match keys look like `2024miket_qm12` or `2024miket_sf2m1`:
//! event key, competition level, optional set number, `m`, match number.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static MATCH_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(20\d\d[\dA-Za-z]{1,8})_(q|ef|qf|sf|f)(\d*)m(\d+)$")
        .expect("match key pattern is valid")
});

/// Competition level, in play order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    Qualification,
    Octofinal,
    Quarterfinal,
    Semifinal,
    Final,
}

impl MatchLevel {
    /// Level from its match key code (`q`, `ef`, `qf`, `sf`, `f`).
    ///
    /// The API's `comp_level` field spells qualifications `qm`; both are
    /// accepted.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "q" | "qm" => Some(Self::Qualification),
            "ef" => Some(Self::Octofinal),
            "qf" => Some(Self::Quarterfinal),
            "sf" => Some(Self::Semifinal),
            "f" => Some(Self::Final),
            _ => None,
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Qualification => "Qualification",
            Self::Octofinal => "Octofinal",
            Self::Quarterfinal => "Quarterfinal",
            Self::Semifinal => "Semifinal",
            Self::Final => "Final",
        })
    }
}

/// The components of a well-formed match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey<'a> {
    pub event: &'a str,
    pub level: MatchLevel,
    /// Absent for qualification keys such as `qm12`
    pub set: Option<u32>,
    pub number: u32,
}

impl<'a> MatchKey<'a> {
    pub fn parse(key: &'a str) -> Option<Self> {
        let captures = MATCH_KEY.captures(key)?;
        let event = captures.get(1)?.as_str();
        let level = MatchLevel::from_code(captures.get(2)?.as_str())?;
        let set = match captures.get(3)?.as_str() {
            "" => None,
            digits => Some(digits.parse().ok()?),
        };
        let number = captures.get(4)?.as_str().parse().ok()?;
        Some(Self {
            event,
            level,
            set,
            number,
        })
    }

    /// Human-readable name, e.g. `Qualification 12` or `Semifinal 2-1`.
    pub fn display_name(&self) -> String {
        match self.set {
            Some(set) => format!("{} {}-{}", self.level, set, self.number),
            None => format!("{} {}", self.level, self.number),
        }
    }
}

/// Order over match keys: event, then level in play order, then set (absent
/// first), then match number. Returns `Equal` only for identical keys.
///
/// Keys that do not parse compare as plain strings against any other key.
/// Among well-formed keys alone the order is total, but once a malformed key
/// is mixed in it is not transitive: `qm9 < qm10` numerically while
/// `qm10 < qm5x < qm9` as strings. A collection holding such a mix has no
/// meaningful iteration order.
pub fn compare_match_keys(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (Some(left), Some(right)) = (MatchKey::parse(a), MatchKey::parse(b)) else {
        return a.cmp(b);
    };

    left.event
        .cmp(right.event)
        .then(left.level.cmp(&right.level))
        .then(left.set.cmp(&right.set))
        .then(left.number.cmp(&right.number))
        // distinct spellings of one match, e.g. leading zeros
        .then_with(|| a.cmp(b))
}
