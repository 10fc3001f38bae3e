//! Long <-> wide conversion of match odds
//!
//! The reference snapshot stores one row per (match, outcome). The program
//! shows one row per match with a column for every label of the fixed
//! vocabulary; cells with no odd are `None`.

use crate::error::{Error, Result};
use crate::types::{Odd, OddLabel};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::debug;

/// One (match, outcome, price) row
#[derive(Debug, Clone, PartialEq)]
pub struct LongOdd {
    pub odd_match_code: i64,
    pub label: OddLabel,
    pub value: f64,
}

impl LongOdd {
    /// `None` when the odd's label is outside the vocabulary
    pub fn from_odd(odd: &Odd) -> Option<Self> {
        OddLabel::parse(&odd.odd_name).map(|label| Self {
            odd_match_code: odd.odd_match_code,
            label,
            value: odd.odd_value,
        })
    }
}

/// Prices of one match indexed by outcome label
#[derive(Debug, Clone, PartialEq)]
pub struct WideOdds {
    cells: [Option<f64>; OddLabel::COUNT],
}

impl Default for WideOdds {
    fn default() -> Self {
        Self {
            cells: [None; OddLabel::COUNT],
        }
    }
}

impl WideOdds {
    pub fn get(&self, label: OddLabel) -> Option<f64> {
        self.cells[label.index()]
    }

    pub fn set(&mut self, label: OddLabel, value: f64) -> Option<f64> {
        self.cells[label.index()].replace(value)
    }

    /// Labels that carry a price, in column order
    pub fn populated(&self) -> impl Iterator<Item = (OddLabel, f64)> + '_ {
        OddLabel::all().filter_map(move |label| self.get(label).map(|v| (label, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

impl Serialize for WideOdds {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(OddLabel::COUNT))?;
        for label in OddLabel::all() {
            map.serialize_entry(label.as_str(), &self.get(label))?;
        }
        map.end()
    }
}

/// Pivot long rows into one `WideOdds` per match.
///
/// Two rows for the same (match, label) break the reference invariant and
/// are rejected.
pub fn pivot(rows: &[LongOdd]) -> Result<BTreeMap<i64, WideOdds>> {
    let mut wide: BTreeMap<i64, WideOdds> = BTreeMap::new();

    for row in rows {
        let cells = wide.entry(row.odd_match_code).or_default();
        if cells.set(row.label, row.value).is_some() {
            return Err(Error::DuplicateOutcome {
                match_code: row.odd_match_code,
                label: row.label.to_string(),
            });
        }
    }

    Ok(wide)
}

/// Pivot raw reference odds, skipping labels outside the vocabulary
pub fn pivot_odds(odds: &[Odd]) -> Result<BTreeMap<i64, WideOdds>> {
    let rows: Vec<LongOdd> = odds
        .iter()
        .filter_map(|odd| {
            let row = LongOdd::from_odd(odd);
            if row.is_none() {
                debug!("Ignoring odd {} with unknown label '{}'", odd.key, odd.odd_name);
            }
            row
        })
        .collect();
    pivot(&rows)
}

/// Explode wide rows back into long rows. Empty cells produce nothing.
pub fn explode(wide: &BTreeMap<i64, WideOdds>) -> Vec<LongOdd> {
    wide.iter()
        .flat_map(|(&odd_match_code, cells)| {
            cells.populated().map(move |(label, value)| LongOdd {
                odd_match_code,
                label,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: i64, label: &str, value: f64) -> LongOdd {
        LongOdd {
            odd_match_code: code,
            label: OddLabel::parse(label).unwrap(),
            value,
        }
    }

    #[test]
    fn test_pivot_then_explode_keeps_populated_cells() {
        let rows = vec![
            row(1, "1", 1.8),
            row(1, "X", 3.4),
            row(1, "+ 2.5 go.", 1.95),
            row(2, "2", 4.1),
        ];

        let wide = pivot(&rows).unwrap();
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[&1].get(OddLabel::parse("X").unwrap()), Some(3.4));
        assert_eq!(wide[&1].get(OddLabel::parse("2").unwrap()), None);
        assert_eq!(wide[&2].populated().count(), 1);

        let mut exploded = explode(&wide);
        let mut expected = rows.clone();
        let sort_key = |r: &LongOdd| (r.odd_match_code, r.label);
        exploded.sort_by_key(sort_key);
        expected.sort_by_key(sort_key);
        assert_eq!(exploded, expected);
    }

    #[test]
    fn test_duplicate_outcome_is_rejected() {
        let rows = vec![row(7, "1X", 1.2), row(7, "1X", 1.3)];
        match pivot(&rows) {
            Err(Error::DuplicateOutcome { match_code, label }) => {
                assert_eq!(match_code, 7);
                assert_eq!(label, "1X");
            }
            other => panic!("expected duplicate outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_labels_are_skipped() {
        let odds = vec![
            Odd {
                key: "k1".into(),
                odd_match_code: 3,
                odd_name: "1".into(),
                odd_value: 2.0,
                odd_threshold: None,
                is_winning: None,
            },
            Odd {
                key: "k2".into(),
                odd_match_code: 3,
                odd_name: "both teams score".into(),
                odd_value: 1.7,
                odd_threshold: None,
                is_winning: None,
            },
        ];
        let wide = pivot_odds(&odds).unwrap();
        assert_eq!(wide[&3].populated().count(), 1);
    }

    #[test]
    fn test_empty_cells_serialize_as_null() {
        let mut cells = WideOdds::default();
        cells.set(OddLabel::parse("1").unwrap(), 1.5);
        let json = serde_json::to_value(&cells).unwrap();
        assert_eq!(json["1"], serde_json::json!(1.5));
        assert!(json["X"].is_null());
        assert_eq!(json.as_object().unwrap().len(), 18);
    }
}
