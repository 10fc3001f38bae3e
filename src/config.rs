//! Configuration management for the Sporacle dashboard

use anyhow::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Dashboard configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the reference odds snapshot (read-only)
    pub reference_db_path: String,

    /// Path to the local bet list database
    pub local_db_path: String,

    /// Where the reference snapshot is downloaded from
    pub reference_db_url: String,

    /// Stake used for summaries when none is given
    pub default_bet_amount: Decimal,

    /// Smallest stake accepted for a summary
    pub min_bet_amount: Decimal,

    /// Largest stake accepted for a summary
    pub max_bet_amount: Decimal,

    /// Bet lists with fewer chosen odds than this get a warning
    pub min_odds_warning: usize,

    /// Port for the JSON API server
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_db_path: "database.db".to_string(),
            local_db_path: "local.database.db".to_string(),
            reference_db_url: SnapshotSource::DEFAULT_URL.to_string(),
            default_bet_amount: Decimal::from(10),
            min_bet_amount: Decimal::from(10),
            max_bet_amount: Decimal::from(1_000_000),
            min_odds_warning: 3,
            server_port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let reference_db_path = env::var("REFERENCE_DB_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.reference_db_path);

        let local_db_path = env::var("LOCAL_DB_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.local_db_path);

        let reference_db_url = env::var("REFERENCE_DB_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.reference_db_url);

        let default_bet_amount = env::var("DEFAULT_BET_AMOUNT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.default_bet_amount);

        let min_bet_amount = env::var("MIN_BET_AMOUNT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.min_bet_amount);

        let max_bet_amount = env::var("MAX_BET_AMOUNT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.max_bet_amount);

        let min_odds_warning = env::var("MIN_ODDS_WARNING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_odds_warning);

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.server_port);

        if reference_db_path == local_db_path {
            anyhow::bail!("REFERENCE_DB_PATH and LOCAL_DB_PATH must point to different files");
        }

        if default_bet_amount < min_bet_amount {
            anyhow::bail!(
                "DEFAULT_BET_AMOUNT ({}) is below MIN_BET_AMOUNT ({})",
                default_bet_amount,
                min_bet_amount
            );
        }

        if default_bet_amount > max_bet_amount {
            anyhow::bail!(
                "DEFAULT_BET_AMOUNT ({}) is above MAX_BET_AMOUNT ({})",
                default_bet_amount,
                max_bet_amount
            );
        }

        Ok(Self {
            reference_db_path,
            local_db_path,
            reference_db_url,
            default_bet_amount,
            min_bet_amount,
            max_bet_amount,
            min_odds_warning,
            server_port,
        })
    }

    /// Stake to use for a summary, falling back to the default and
    /// rejecting anything outside the configured range
    pub fn bet_amount(&self, requested: Option<Decimal>) -> Result<Decimal> {
        let amount = requested.unwrap_or(self.default_bet_amount);
        if amount < self.min_bet_amount {
            anyhow::bail!(
                "Bet amount {} is below the minimum of {}",
                amount,
                self.min_bet_amount
            );
        }
        if amount > self.max_bet_amount {
            anyhow::bail!(
                "Bet amount {} is above the maximum of {}",
                amount,
                self.max_bet_amount
            );
        }
        Ok(amount)
    }
}

/// Public reference snapshot location
pub struct SnapshotSource;

impl SnapshotSource {
    pub const DEFAULT_URL: &'static str =
        "https://raw.githubusercontent.com/SPORTS-DDD/sporacle_app/refs/heads/database/data/database.db";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_amount_defaults_and_minimum() {
        let config = Config::default();
        assert_eq!(config.bet_amount(None).unwrap(), Decimal::from(10));
        assert_eq!(config.bet_amount(Some(Decimal::from(25))).unwrap(), Decimal::from(25));
        assert!(config.bet_amount(Some(Decimal::from(5))).is_err());
        assert!(config.bet_amount(Some(Decimal::MAX)).is_err());
        assert!(config.bet_amount(Some(config.max_bet_amount)).is_ok());
    }
}
