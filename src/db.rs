//! SQLite database for the user's saved bet lists

use crate::error::{Error, Result, ValidationWarning};
use crate::reference::ReferenceStore;
use crate::types::{format_timestamp, parse_timestamp, BetList, OddDetail, UpsertOutcome};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Local bet list store
pub struct LocalStore {
    pool: RwLock<SqlitePool>,
    path: PathBuf,
}

impl LocalStore {
    /// Open (or create) the local database
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pool = connect(&path).await?;
        initialize(&pool).await?;

        Ok(Self {
            pool: RwLock::new(pool),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current connection pool. Cheap to clone; replaced on import/reset.
    ///
    /// Statements issued by the store itself hold the read side of the lock
    /// for their whole run, so a swap waits for them to finish.
    pub async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Create the bet list, or replace the odds of the existing one.
    ///
    /// The key set and both cached dates are written in one transaction.
    pub async fn upsert_bet_list(&self, name: &str, odds: &[OddDetail]) -> Result<UpsertOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationWarning::MissingName.into());
        }
        let (earliest, latest) = date_bounds(odds).ok_or(ValidationWarning::EmptyBetList)?;

        let mut seen = HashSet::new();
        let keys: Vec<&str> = odds
            .iter()
            .map(|o| o.key.as_str())
            .filter(|k| seen.insert(*k))
            .collect();
        let keys_json = serde_json::to_string(&keys)?;
        let now = format_timestamp(&Utc::now());

        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT bet_list_name FROM bet_lists WHERE bet_list_name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE bet_lists
                SET odds = ?, earliest_match_date = ?, latest_match_date = ?, modification_date = ?
                WHERE bet_list_name = ?
                "#,
            )
            .bind(&keys_json)
            .bind(format_timestamp(&earliest))
            .bind(format_timestamp(&latest))
            .bind(&now)
            .bind(name)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated
        } else {
            sqlx::query(
                r#"
                INSERT INTO bet_lists (bet_list_name, creation_date, modification_date, odds, earliest_match_date, latest_match_date)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(&now)
            .bind(&now)
            .bind(&keys_json)
            .bind(format_timestamp(&earliest))
            .bind(format_timestamp(&latest))
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Created
        };

        tx.commit().await?;

        info!("Bet list '{}' {} with {} odds", name, outcome, keys.len());
        Ok(outcome)
    }

    /// Remove a bet list. Fails if it does not exist.
    pub async fn delete_bet_list(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM bet_lists WHERE bet_list_name = ?")
            .bind(name)
            .execute(&*self.pool.read().await)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::bet_list_not_found(name));
        }

        info!("Bet list '{}' deleted", name);
        Ok(())
    }

    /// Exactly one bet list by name
    pub async fn bet_list(&self, name: &str) -> Result<BetList> {
        self.find_bet_list(name)
            .await?
            .ok_or_else(|| Error::bet_list_not_found(name))
    }

    pub async fn find_bet_list(&self, name: &str) -> Result<Option<BetList>> {
        let row = sqlx::query("SELECT * FROM bet_lists WHERE bet_list_name = ?")
            .bind(name)
            .fetch_optional(&*self.pool.read().await)
            .await?;

        row.as_ref().map(row_to_bet_list).transpose()
    }

    pub async fn bet_list_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT bet_list_name FROM bet_lists ORDER BY bet_list_name")
            .fetch_all(&*self.pool.read().await)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Every saved bet list, soonest to finish first
    pub async fn bet_lists(&self) -> Result<Vec<BetList>> {
        let rows = sqlx::query("SELECT * FROM bet_lists ORDER BY latest_match_date, bet_list_name")
            .fetch_all(&*self.pool.read().await)
            .await?;
        rows.iter().map(row_to_bet_list).collect()
    }

    /// Bet lists whose last match kicks off after `now`
    pub async fn on_going_bet_lists(&self, now: DateTime<Utc>) -> Result<Vec<BetList>> {
        let rows = sqlx::query(
            "SELECT * FROM bet_lists WHERE latest_match_date > ? ORDER BY latest_match_date, bet_list_name",
        )
        .bind(format_timestamp(&now))
        .fetch_all(&*self.pool.read().await)
        .await?;
        rows.iter().map(row_to_bet_list).collect()
    }

    /// Bet lists whose last match has kicked off
    pub async fn at_term_bet_lists(&self, now: DateTime<Utc>) -> Result<Vec<BetList>> {
        let rows = sqlx::query(
            "SELECT * FROM bet_lists WHERE latest_match_date <= ? ORDER BY latest_match_date, bet_list_name",
        )
        .bind(format_timestamp(&now))
        .fetch_all(&*self.pool.read().await)
        .await?;
        rows.iter().map(row_to_bet_list).collect()
    }

    /// Recompute the cached date bounds of every list from the reference
    /// snapshot. Returns how many lists changed.
    pub async fn refresh_date_bounds(&self, reference: &ReferenceStore) -> Result<usize> {
        let mut changed = 0;

        for list in self.bet_lists().await? {
            let details = reference.odd_details(&list.odds).await?;
            let Some((earliest, latest)) = date_bounds(&details) else {
                warn!("Bet list '{}' has no odds left in the reference database", list.bet_list_name);
                continue;
            };
            if earliest == list.earliest_match_date && latest == list.latest_match_date {
                continue;
            }

            sqlx::query("UPDATE bet_lists SET earliest_match_date = ?, latest_match_date = ? WHERE bet_list_name = ?")
                .bind(format_timestamp(&earliest))
                .bind(format_timestamp(&latest))
                .bind(&list.bet_list_name)
                .execute(&*self.pool.read().await)
                .await?;
            changed += 1;
        }

        if changed > 0 {
            info!("Refreshed date bounds of {} bet lists", changed);
        }
        Ok(changed)
    }

    /// Replace the database with a new empty one.
    ///
    /// The empty file is built next to the current one; any failure before
    /// the swap leaves the current database in service.
    pub async fn reset(&self) -> Result<()> {
        let scratch = self.path.with_extension("reset");
        remove_if_exists(&scratch).await?;

        let fresh = connect(&scratch).await?;
        let built = initialize(&fresh).await;
        fresh.close().await;
        if let Err(e) = built {
            remove_if_exists(&scratch).await?;
            return Err(e);
        }

        self.swap_in(&scratch).await?;
        info!("Local database {} recreated", self.path.display());
        Ok(())
    }

    /// The database file, verbatim
    pub async fn export(&self) -> Result<Vec<u8>> {
        // Exclusive: no statement runs while the file is read
        let _pool = self.pool.write().await;
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Overwrite the database with an uploaded file.
    ///
    /// The blob is checked in a scratch file first; a corrupt upload leaves
    /// the current database untouched.
    pub async fn import(&self, bytes: &[u8]) -> Result<()> {
        let scratch = self.path.with_extension("import");
        tokio::fs::write(&scratch, bytes).await?;

        if let Err(e) = verify_import(&scratch).await {
            remove_if_exists(&scratch).await?;
            return Err(e);
        }

        self.swap_in(&scratch).await?;
        info!("Imported local database ({} bytes)", bytes.len());
        Ok(())
    }

    /// Move a prepared file over the database and reopen it.
    ///
    /// The old pool stays installed until the new one is connected, so a
    /// failed rename or connect leaves the store answering.
    async fn swap_in(&self, scratch: &Path) -> Result<()> {
        let mut pool = self.pool.write().await;

        if let Err(e) = tokio::fs::rename(scratch, &self.path).await {
            warn!("Could not move {} into place: {}", scratch.display(), e);
            remove_if_exists(scratch).await?;
            return Err(e.into());
        }

        let fresh = connect(&self.path).await?;
        initialize(&fresh).await?;
        let old = std::mem::replace(&mut *pool, fresh);
        old.close().await;
        Ok(())
    }
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    // Rollback journal keeps the whole database in one file for export
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Initialize database schema
async fn initialize(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bet_lists (
            bet_list_name TEXT PRIMARY KEY,
            creation_date TEXT NOT NULL,
            modification_date TEXT NOT NULL,
            odds TEXT NOT NULL DEFAULT '[]',
            earliest_match_date TEXT NOT NULL,
            latest_match_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    run_migrations(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bet_lists_latest ON bet_lists(latest_match_date)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Bring databases saved with the association-table layout up to date.
///
/// Older files kept the odds of a list in `bet_lists__bet_list_odds` and had
/// no cached dates. Keys are folded into the JSON column; the dates start at
/// the creation date, rewritten to the `format_timestamp` layout so text
/// comparison holds, until `refresh_date_bounds` runs.
async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let table_info: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as("PRAGMA table_info(bet_lists)")
            .fetch_all(pool)
            .await?;

    let has_column = |column: &str| table_info.iter().any(|(_, name, _, _, _, _)| name == column);

    if !has_column("odds") {
        info!("Migrating bet_lists table: adding odds column");
        sqlx::query("ALTER TABLE bet_lists ADD COLUMN odds TEXT NOT NULL DEFAULT '[]'")
            .execute(pool)
            .await?;

        let association: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'bet_lists__bet_list_odds'",
        )
        .fetch_optional(pool)
        .await?;

        if association.is_some() {
            info!("Migrating bet_lists__bet_list_odds into bet_lists.odds");
            sqlx::query(
                r#"
                UPDATE bet_lists
                SET odds = COALESCE((
                    SELECT json_group_array(a.odd_key)
                    FROM bet_lists__bet_list_odds a
                    WHERE a.bet_list_name = bet_lists.bet_list_name
                ), '[]')
                "#,
            )
            .execute(pool)
            .await?;
        }
    }

    for column in ["earliest_match_date", "latest_match_date"] {
        if !has_column(column) {
            info!("Migrating bet_lists table: adding {} column", column);
            sqlx::query(&format!("ALTER TABLE bet_lists ADD COLUMN {} TEXT", column))
                .execute(pool)
                .await?;
            sqlx::query(&format!(
                "UPDATE bet_lists SET {} = COALESCE(strftime('%Y-%m-%dT%H:%M:%SZ', creation_date), creation_date)",
                column
            ))
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

async fn verify_import(path: &Path) -> Result<()> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| Error::InvalidImport(e.to_string()))?;

    let checked: Result<()> = async {
        let (status,): (String,) = sqlx::query_as("PRAGMA quick_check")
            .fetch_one(&pool)
            .await
            .map_err(|e| Error::InvalidImport(e.to_string()))?;
        if status != "ok" {
            return Err(Error::InvalidImport(status));
        }

        let table: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'bet_lists'",
        )
        .fetch_optional(&pool)
        .await
        .map_err(|e| Error::InvalidImport(e.to_string()))?;
        if table.is_none() {
            return Err(Error::InvalidImport("no bet_lists table".to_string()));
        }
        Ok(())
    }
    .await;

    pool.close().await;
    checked
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Earliest and latest match of a set of odds
pub fn date_bounds(odds: &[OddDetail]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let earliest = odds.iter().map(|o| o.match_datetime).min()?;
    let latest = odds.iter().map(|o| o.match_datetime).max()?;
    Some((earliest, latest))
}

fn row_to_bet_list(row: &SqliteRow) -> Result<BetList> {
    let odds_json: String = row.try_get("odds")?;
    let creation_date: String = row.try_get("creation_date")?;
    let modification_date: String = row.try_get("modification_date")?;
    let earliest: String = row.try_get("earliest_match_date")?;
    let latest: String = row.try_get("latest_match_date")?;

    Ok(BetList {
        bet_list_name: row.try_get("bet_list_name")?,
        creation_date: parse_timestamp(&creation_date)?,
        modification_date: parse_timestamp(&modification_date)?,
        odds: serde_json::from_str(&odds_json)?,
        earliest_match_date: parse_timestamp(&earliest)?,
        latest_match_date: parse_timestamp(&latest)?,
    })
}
