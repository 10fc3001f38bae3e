//! In-progress bet list selection
//!
//! A match enters the selection when it is ticked in the program and gets a
//! chosen odd when one outcome is picked for it. Nothing here touches the
//! database; the selection is flattened into odd records on save.

use crate::error::{Result, ValidationWarning};
use crate::types::OddDetail;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Matches picked for a bet list and the odd chosen for each
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    matches: BTreeMap<i64, Option<OddDetail>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selection with every odd already chosen, e.g. a saved bet list
    /// being edited
    pub fn from_odds(odds: impl IntoIterator<Item = OddDetail>) -> Self {
        Self {
            matches: odds
                .into_iter()
                .map(|odd| (odd.odd_match_code, Some(odd)))
                .collect(),
        }
    }

    /// Add a match with no choice yet. A match already present keeps its
    /// choice. Returns whether the match was added.
    pub fn enter_match(&mut self, match_code: i64) -> bool {
        if self.matches.contains_key(&match_code) {
            return false;
        }
        self.matches.insert(match_code, None);
        true
    }

    /// Drop a match and its choice
    pub fn remove_match(&mut self, match_code: i64) -> bool {
        self.matches.remove(&match_code).is_some()
    }

    /// Choose the odd for an entered match, replacing any previous choice.
    /// Returns the replaced odd.
    pub fn choose_odd(&mut self, match_code: i64, odd: OddDetail) -> Result<Option<OddDetail>> {
        if odd.odd_match_code != match_code {
            return Err(ValidationWarning::OddMatchMismatch {
                match_code,
                odd_key: odd.key,
            }
            .into());
        }

        let slot = self
            .matches
            .get_mut(&match_code)
            .ok_or(ValidationWarning::MatchNotSelected(match_code))?;

        debug!("Match {} -> odd {} ({})", match_code, odd.key, odd.odd_name);
        Ok(slot.replace(odd))
    }

    pub fn chosen(&self, match_code: i64) -> Option<&OddDetail> {
        self.matches.get(&match_code).and_then(Option::as_ref)
    }

    pub fn contains(&self, match_code: i64) -> bool {
        self.matches.contains_key(&match_code)
    }

    pub fn match_codes(&self) -> impl Iterator<Item = i64> + '_ {
        self.matches.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Chosen odds in match order
    pub fn chosen_odds(&self) -> impl Iterator<Item = &OddDetail> {
        self.matches.values().flatten()
    }

    /// Entered matches still waiting for a choice
    pub fn missing_choices(&self) -> Vec<i64> {
        self.matches
            .iter()
            .filter(|(_, odd)| odd.is_none())
            .map(|(code, _)| *code)
            .collect()
    }

    /// Every entered match has a chosen odd
    pub fn is_valid(&self) -> bool {
        self.matches.values().all(Option::is_some)
    }

    /// Figures for the current choices, valid or not. Fails only when the
    /// payout does not fit in a `Decimal`.
    pub fn summary(&self, bet_amount: Decimal) -> std::result::Result<Summary, ValidationWarning> {
        Summary::compute(self.chosen_odds(), bet_amount, self.is_valid())
    }

    /// The summary, or the warning to show instead when a match has no
    /// chosen odd
    pub fn checked_summary(&self, bet_amount: Decimal) -> std::result::Result<Summary, ValidationWarning> {
        let missing = self.missing_choices();
        if !missing.is_empty() {
            return Err(ValidationWarning::MissingChoice { match_codes: missing });
        }
        self.summary(bet_amount)
    }

    /// Warnings that do not block saving
    pub fn warnings(&self, min_odds: usize) -> Vec<ValidationWarning> {
        let count = self.chosen_odds().count();
        if count < min_odds {
            vec![ValidationWarning::TooFewOdds { count, minimum: min_odds }]
        } else {
            Vec::new()
        }
    }

    /// Flatten into the odd records saved with a bet list
    pub fn to_bet_list_odds(&self) -> Result<Vec<OddDetail>> {
        let missing = self.missing_choices();
        if !missing.is_empty() {
            return Err(ValidationWarning::MissingChoice { match_codes: missing }.into());
        }
        if self.is_empty() {
            return Err(ValidationWarning::EmptyBetList.into());
        }
        Ok(self.chosen_odds().cloned().collect())
    }
}

/// Totals shown for a bet list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Product of the chosen prices, 0 when nothing is chosen
    pub total_price: f64,
    pub bet_amount: Decimal,
    /// floor(bet_amount × total_price)
    pub potential_payout: Decimal,
    pub match_count: usize,
    pub earliest_match: Option<DateTime<Utc>>,
    pub latest_match: Option<DateTime<Utc>>,
    pub is_valid: bool,
}

impl Summary {
    /// Summary of a saved list's odds
    pub fn from_odds<'a>(
        odds: impl IntoIterator<Item = &'a OddDetail>,
        bet_amount: Decimal,
    ) -> std::result::Result<Self, ValidationWarning> {
        Self::compute(odds, bet_amount, true)
    }

    fn compute<'a>(
        odds: impl IntoIterator<Item = &'a OddDetail>,
        bet_amount: Decimal,
        is_valid: bool,
    ) -> std::result::Result<Self, ValidationWarning> {
        let odds: Vec<&OddDetail> = odds.into_iter().collect();

        let total_price = if odds.is_empty() {
            0.0
        } else {
            odds.iter().map(|o| o.odd_value).product()
        };

        // Prices are published with two decimals: take each at its shortest
        // decimal form so 2.3 stays 2.3 rather than 2.29999...
        let potential_payout = if odds.is_empty() {
            Decimal::ZERO
        } else {
            odds.iter()
                .try_fold(bet_amount, |acc, odd| {
                    Decimal::from_f64(odd.odd_value).and_then(|price| acc.checked_mul(price))
                })
                .ok_or(ValidationWarning::PayoutOverflow { bet_amount })?
                .floor()
        };

        Ok(Self {
            total_price,
            bet_amount,
            potential_payout,
            match_count: odds.len(),
            earliest_match: odds.iter().map(|o| o.match_datetime).min(),
            latest_match: odds.iter().map(|o| o.match_datetime).max(),
            is_valid,
        })
    }
}
