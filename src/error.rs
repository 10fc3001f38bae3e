//! Error types for the bet list dashboard
//!
//! Every failure is either a user-visible warning or a hard stop of the
//! current action. Nothing here is retried.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // Selection / save validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationWarning),

    #[error("A bet list named '{0}' already exists")]
    DuplicateName(String),

    // Reference data integrity
    #[error("Duplicate odd '{label}' for match {match_code}")]
    DuplicateOutcome { match_code: i64, label: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid database import: {0}")]
    InvalidImport(String),

    // Encoding errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Snapshot download failed with status {status}")]
    Download { status: u16 },
}

impl Error {
    pub fn bet_list_not_found(name: &str) -> Self {
        Error::NotFound {
            entity: "Bet list",
            id: name.to_string(),
        }
    }

    pub fn odds_not_found(keys: &[String]) -> Self {
        Error::NotFound {
            entity: "Odds",
            id: keys.join(", "),
        }
    }

    /// Whether the error only blocks the current summary/save and should be
    /// shown inline as a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::DuplicateName(_))
    }

    /// Human-readable message for front ends
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound { entity, id } => format!("{} not found: {}", entity, id),
            Error::Validation(warning) => warning.to_string(),
            Error::DuplicateName(name) => {
                format!("A bet list named {} already exists in the database.", name)
            }
            Error::InvalidImport(reason) => format!("The imported file is not a valid local database: {}", reason),
            Error::Http(_) | Error::Download { .. } => {
                format!("Could not download the odds database: {}", self)
            }
            other => other.to_string(),
        }
    }
}

/// Non-fatal problems with an in-progress selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Some entered matches have no chosen odd
    MissingChoice { match_codes: Vec<i64> },
    /// Fewer odds than the recommended minimum
    TooFewOdds { count: usize, minimum: usize },
    /// Nothing to save
    EmptyBetList,
    /// Bet list name is blank
    MissingName,
    /// An odd was chosen for a match that was never entered
    MatchNotSelected(i64),
    /// The chosen odd belongs to another match
    OddMatchMismatch { match_code: i64, odd_key: String },
    /// The match has already kicked off
    MatchStarted(i64),
    /// Stake times price does not fit in a decimal
    PayoutOverflow { bet_amount: Decimal },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::MissingChoice { match_codes } => write!(
                f,
                "An odd choice is required for every selected match (missing: {})",
                match_codes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ValidationWarning::TooFewOdds { count, minimum } => write!(
                f,
                "A bet list should contain at least {} odds ({} chosen)",
                minimum, count
            ),
            ValidationWarning::EmptyBetList => write!(f, "A bet list must contain at least one odd"),
            ValidationWarning::MissingName => write!(f, "First create a name for your bet list"),
            ValidationWarning::MatchNotSelected(code) => {
                write!(f, "Match {} is not part of the selection", code)
            }
            ValidationWarning::OddMatchMismatch { match_code, odd_key } => {
                write!(f, "Odd {} does not belong to match {}", odd_key, match_code)
            }
            ValidationWarning::MatchStarted(code) => {
                write!(f, "Match {} has already started", code)
            }
            ValidationWarning::PayoutOverflow { bet_amount } => {
                write!(f, "Bet amount {} is too large to compute a payout", bet_amount)
            }
        }
    }
}

impl std::error::Error for ValidationWarning {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_classification() {
        let err: Error = ValidationWarning::EmptyBetList.into();
        assert!(err.is_warning());
        assert!(Error::DuplicateName("weekend".into()).is_warning());
        assert!(!Error::bet_list_not_found("weekend").is_warning());
    }

    #[test]
    fn test_missing_choice_message_lists_matches() {
        let warning = ValidationWarning::MissingChoice { match_codes: vec![12, 40] };
        assert!(warning.to_string().contains("12, 40"));
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::bet_list_not_found("weekend");
        assert_eq!(err.user_message(), "Bet list not found: weekend");
    }
}
