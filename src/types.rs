//! Core types for the bet list dashboard

use crate::error::{Error, Result};
use crate::pivot::WideOdds;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Goal lines offered by the over/under markets
pub const GOAL_LINES: [f64; 6] = [0.5, 1.5, 2.5, 3.5, 4.5, 5.5];

/// Outcome labels in program column order. Must match the reference data
/// exactly.
pub const ODD_LABELS: [&str; 18] = [
    "1", "X", "2",
    "1X", "X2", "12",
    "- 0.5 go.", "+ 0.5 go.",
    "- 1.5 go.", "+ 1.5 go.",
    "- 2.5 go.", "+ 2.5 go.",
    "- 3.5 go.", "+ 3.5 go.",
    "- 4.5 go.", "+ 4.5 go.",
    "- 5.5 go.", "+ 5.5 go.",
];

/// One label of the fixed outcome vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OddLabel(usize);

impl OddLabel {
    pub const COUNT: usize = ODD_LABELS.len();

    /// All labels in column order
    pub fn all() -> impl Iterator<Item = OddLabel> {
        (0..Self::COUNT).map(OddLabel)
    }

    /// Exact match against the vocabulary
    pub fn parse(label: &str) -> Option<Self> {
        ODD_LABELS.iter().position(|l| *l == label).map(OddLabel)
    }

    pub fn as_str(&self) -> &'static str {
        ODD_LABELS[self.0]
    }

    /// Column position in the wide program
    pub fn index(&self) -> usize {
        self.0
    }

    /// Goal line for over/under labels
    pub fn threshold(&self) -> Option<f64> {
        self.0.checked_sub(6).map(|i| GOAL_LINES[i / 2])
    }

    pub fn is_over(&self) -> bool {
        self.0 >= 6 && self.0 % 2 == 1
    }
}

impl fmt::Display for OddLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OddLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OddLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OddLabel::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown odd label '{}'", s)))
    }
}

/// A competition from the reference snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub competition_code: String,
    pub name: String,
    pub is_top_flight: bool,
}

/// A match from the reference snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub odd_match_code: i64,
    pub competition_code: String,
    pub match_date: DateTime<Utc>,
    pub description: String,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_ht_goals: Option<i64>,
    pub away_ht_goals: Option<i64>,
    pub home_ft_goals: Option<i64>,
    pub away_ft_goals: Option<i64>,
}

impl Match {
    /// Goal counts only appear once the match has been played
    pub fn is_concluded(&self) -> bool {
        self.home_ft_goals.is_some() && self.away_ft_goals.is_some()
    }
}

/// One priced outcome of a match, as stored in the reference snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odd {
    pub key: String,
    pub odd_match_code: i64,
    pub odd_name: String,
    pub odd_value: f64,
    pub odd_threshold: Option<f64>,
    pub is_winning: Option<bool>,
}

/// An odd joined with its match and competition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddDetail {
    pub key: String,
    pub odd_match_code: i64,
    pub odd_name: String,
    pub odd_value: f64,
    pub odd_threshold: Option<f64>,
    pub is_winning: Option<bool>,
    pub match_description: String,
    pub match_datetime: DateTime<Utc>,
    pub competition: Option<String>,
}

/// A saved bet list from the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetList {
    pub bet_list_name: String,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
    /// Keys of the referenced odds
    pub odds: Vec<String>,
    pub earliest_match_date: DateTime<Utc>,
    pub latest_match_date: DateTime<Utc>,
}

impl BetList {
    /// Outcome cannot be known before the last match kicks off
    pub fn is_on_going(&self, now: DateTime<Utc>) -> bool {
        self.latest_match_date > now
    }
}

/// Whether a save created a new bet list or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Updated => write!(f, "updated"),
        }
    }
}

/// One upcoming match with its odds in wide form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramRow {
    pub odd_match_code: i64,
    pub match_date: DateTime<Utc>,
    pub competition_name: Option<String>,
    pub description: String,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub odds: WideOdds,
}

/// A bet list with its odds resolved to full records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetListDetail {
    pub bet_list: BetList,
    pub odds: Vec<OddDetail>,
}

/// One (bet list, odd) row of the resolved view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOdd {
    pub bet_list_name: String,
    #[serde(flatten)]
    pub odd: OddDetail,
}

/// A bet list whose matches have all kicked off, grouped with its odds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBetList {
    pub bet_list_name: String,
    pub odds: Vec<OddDetail>,
}

impl ResolvedBetList {
    /// Winning iff every odd resolved winning. An unresolved odd is not a win.
    pub fn is_winning(&self) -> bool {
        !self.odds.is_empty() && self.odds.iter().all(|o| o.is_winning == Some(true))
    }

    /// Odds that did not win
    pub fn losing_count(&self) -> usize {
        self.odds.iter().filter(|o| o.is_winning != Some(true)).count()
    }

    pub fn match_count(&self) -> usize {
        self.odds.len()
    }

    pub fn total_price(&self) -> f64 {
        self.odds.iter().map(|o| o.odd_value).product()
    }
}

/// Number of winning and losing resolved bet lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WinLoseCount {
    pub winning: usize,
    pub losing: usize,
}

impl WinLoseCount {
    pub fn from_lists(lists: &[ResolvedBetList]) -> Self {
        lists.iter().fold(Self::default(), |mut acc, list| {
            if list.is_winning() {
                acc.winning += 1;
            } else {
                acc.losing += 1;
            }
            acc
        })
    }
}

/// Format a timestamp the way the local store writes it. Fixed width, so
/// stored values compare correctly as text.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS` layout found in the reference snapshot (read as UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::Timestamp {
        value: value.to_string(),
        reason: "unrecognized format".to_string(),
    })
}
