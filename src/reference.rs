//! Read-only access to the reference odds snapshot
//!
//! The snapshot is produced elsewhere and replaced as a whole file. This
//! module only reads it.

use crate::error::{Error, Result};
use crate::types::{parse_timestamp, Competition, Match, Odd, OddDetail};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bound parameters per `IN (...)` query
const IN_CHUNK: usize = 500;

/// Tables of the reference snapshot
pub const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS competitions (
        competition_code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_top_flight INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        odd_match_code INTEGER PRIMARY KEY,
        competition_code TEXT,
        match_date TEXT NOT NULL,
        description TEXT NOT NULL,
        home_team TEXT,
        away_team TEXT,
        home_ht_goals INTEGER,
        away_ht_goals INTEGER,
        home_ft_goals INTEGER,
        away_ft_goals INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS odds (
        key TEXT PRIMARY KEY,
        odd_match_code INTEGER NOT NULL,
        odd_name TEXT NOT NULL,
        odd_value REAL NOT NULL,
        odd_threshold REAL,
        is_winning INTEGER,
        UNIQUE (odd_match_code, odd_name)
    )
    "#,
];

const ODD_DETAIL_SELECT: &str = r#"
    SELECT
        odds.key,
        odds.odd_match_code,
        odds.odd_name,
        odds.odd_value,
        odds.odd_threshold,
        odds.is_winning,
        matches.description AS match_description,
        CAST(matches.match_date AS TEXT) AS match_datetime,
        competitions.name AS competition
    FROM odds
    JOIN matches ON matches.odd_match_code = odds.odd_match_code
    LEFT JOIN competitions ON competitions.competition_code = CAST(matches.competition_code AS TEXT)
"#;

const MATCH_SELECT: &str = r#"
    SELECT
        matches.odd_match_code,
        CAST(matches.competition_code AS TEXT) AS competition_code,
        CAST(matches.match_date AS TEXT) AS match_date,
        matches.description,
        matches.home_team,
        matches.away_team,
        matches.home_ht_goals,
        matches.away_ht_goals,
        matches.home_ft_goals,
        matches.away_ft_goals,
        competitions.name AS competition_name
    FROM matches
    LEFT JOIN competitions ON competitions.competition_code = CAST(matches.competition_code AS TEXT)
"#;

/// Create the snapshot tables on a writable pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// A match together with its competition name
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWithCompetition {
    pub game: Match,
    pub competition_name: Option<String>,
}

/// Read-only reference snapshot
pub struct ReferenceStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl ReferenceStore {
    /// Open an existing snapshot read-only
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("reference database {} does not exist", path.display()),
            )));
        }

        let options = SqliteConnectOptions::new().filename(&path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Opened reference database {}", path.display());
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn competitions(&self) -> Result<Vec<Competition>> {
        let rows = sqlx::query(
            "SELECT CAST(competition_code AS TEXT) AS competition_code, name, is_top_flight FROM competitions ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(Competition {
                    competition_code: r.try_get("competition_code")?,
                    name: r.try_get("name")?,
                    is_top_flight: r.try_get::<Option<bool>, _>("is_top_flight")?.unwrap_or(false),
                })
            })
            .collect()
    }

    /// All matches with their competition, ordered by kickoff
    pub async fn matches(&self) -> Result<Vec<MatchWithCompetition>> {
        let rows = sqlx::query(MATCH_SELECT).fetch_all(&self.pool).await?;

        let mut matches = rows
            .iter()
            .map(row_to_match)
            .collect::<Result<Vec<_>>>()?;
        matches.sort_by_key(|m| (m.game.match_date, m.game.odd_match_code));
        Ok(matches)
    }

    /// Matches kicking off strictly after `now`
    pub async fn upcoming_matches(&self, now: DateTime<Utc>) -> Result<Vec<MatchWithCompetition>> {
        // Snapshot timestamps are not guaranteed to be in a text-sortable
        // layout, so the comparison happens after parsing.
        let upcoming: Vec<_> = self
            .matches()
            .await?
            .into_iter()
            .filter(|m| m.game.match_date > now)
            .collect();
        debug!("{} upcoming matches after {}", upcoming.len(), now);
        Ok(upcoming)
    }

    /// Raw odds for the given matches
    pub async fn odds_for_matches(&self, match_codes: &[i64]) -> Result<Vec<Odd>> {
        let mut odds = Vec::new();

        for chunk in match_codes.chunks(IN_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT key, odd_match_code, odd_name, odd_value, odd_threshold, is_winning FROM odds WHERE odd_match_code IN (",
            );
            let mut separated = builder.separated(", ");
            for code in chunk {
                separated.push_bind(*code);
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                odds.push(row_to_odd(row)?);
            }
        }

        Ok(odds)
    }

    /// Full records for the given odd keys, ordered by kickoff. Unknown keys
    /// are simply absent from the result.
    pub async fn odd_details(&self, keys: &[String]) -> Result<Vec<OddDetail>> {
        let mut details = Vec::new();

        for chunk in keys.chunks(IN_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(ODD_DETAIL_SELECT);
            builder.push(" WHERE odds.key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                details.push(row_to_odd_detail(row)?);
            }
        }

        details.sort_by(|a, b| {
            (a.match_datetime, a.odd_match_code, &a.key).cmp(&(b.match_datetime, b.odd_match_code, &b.key))
        });
        Ok(details)
    }

    /// One odd by key
    pub async fn odd_detail(&self, key: &str) -> Result<OddDetail> {
        let keys = [key.to_string()];
        self.odd_details(&keys)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::odds_not_found(&keys))
    }

    /// Every priced outcome of one match
    pub async fn odds_for_match(&self, match_code: i64) -> Result<Vec<OddDetail>> {
        let sql = format!("{} WHERE odds.odd_match_code = ? ORDER BY odds.odd_name", ODD_DETAIL_SELECT);
        let rows = sqlx::query(&sql).bind(match_code).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_odd_detail).collect()
    }

    /// Keys from `keys` that the snapshot does not contain
    pub async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        let found: HashSet<String> = self
            .odd_details(keys)
            .await?
            .into_iter()
            .map(|d| d.key)
            .collect();
        Ok(keys.iter().filter(|k| !found.contains(*k)).cloned().collect())
    }
}

fn row_to_match(row: &SqliteRow) -> Result<MatchWithCompetition> {
    let match_date: String = row.try_get("match_date")?;
    Ok(MatchWithCompetition {
        game: Match {
            odd_match_code: row.try_get("odd_match_code")?,
            competition_code: row
                .try_get::<Option<String>, _>("competition_code")?
                .unwrap_or_default(),
            match_date: parse_timestamp(&match_date)?,
            description: row.try_get("description")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            home_ht_goals: row.try_get("home_ht_goals")?,
            away_ht_goals: row.try_get("away_ht_goals")?,
            home_ft_goals: row.try_get("home_ft_goals")?,
            away_ft_goals: row.try_get("away_ft_goals")?,
        },
        competition_name: row.try_get("competition_name")?,
    })
}

fn row_to_odd(row: &SqliteRow) -> Result<Odd> {
    Ok(Odd {
        key: row.try_get("key")?,
        odd_match_code: row.try_get("odd_match_code")?,
        odd_name: row.try_get("odd_name")?,
        odd_value: row.try_get("odd_value")?,
        odd_threshold: row.try_get("odd_threshold")?,
        is_winning: row.try_get("is_winning")?,
    })
}

fn row_to_odd_detail(row: &SqliteRow) -> Result<OddDetail> {
    let match_datetime: String = row.try_get("match_datetime")?;
    Ok(OddDetail {
        key: row.try_get("key")?,
        odd_match_code: row.try_get("odd_match_code")?,
        odd_name: row.try_get("odd_name")?,
        odd_value: row.try_get("odd_value")?,
        odd_threshold: row.try_get("odd_threshold")?,
        is_winning: row.try_get("is_winning")?,
        match_description: row.try_get("match_description")?,
        match_datetime: parse_timestamp(&match_datetime)?,
        competition: row.try_get("competition")?,
    })
}
