//! Read views combining the reference snapshot and the local store
//!
//! Views never write; only `QueryLayer::open` touches the local store, to
//! bring cached match dates in line with the snapshot. Views take `now`
//! explicitly; callers pass `Utc::now()`.

use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::pivot::pivot_odds;
use crate::reference::ReferenceStore;
use crate::types::{BetList, BetListDetail, OddDetail, ProgramRow, ResolvedBetList, ResolvedOdd, WinLoseCount};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which database a diagnostic query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Reference,
    Local,
    /// In-memory database with the reference attached as `odds_db` and the
    /// local store as `local_db`
    Combined,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Reference => write!(f, "reference"),
            Source::Local => write!(f, "local"),
            Source::Combined => write!(f, "combined"),
        }
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reference" | "ref" | "sporacle" => Ok(Source::Reference),
            "local" => Ok(Source::Local),
            "combined" | "cross" | "cross-database" => Ok(Source::Combined),
            other => Err(format!("unknown source '{}' (expected reference, local or combined)", other)),
        }
    }
}

/// Tabular result of a diagnostic query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Cross-store query layer
#[derive(Clone)]
pub struct QueryLayer {
    reference: Arc<ReferenceStore>,
    local: Arc<LocalStore>,
}

impl QueryLayer {
    pub fn new(reference: Arc<ReferenceStore>, local: Arc<LocalStore>) -> Self {
        Self { reference, local }
    }

    /// Layer over freshly opened stores: cached date bounds are recomputed
    /// from the snapshot first, which also settles migrated lists.
    pub async fn open(reference: Arc<ReferenceStore>, local: Arc<LocalStore>) -> Result<Self> {
        let changed = local.refresh_date_bounds(&reference).await?;
        if changed > 0 {
            info!("{} bet lists had stale match dates", changed);
        }
        Ok(Self::new(reference, local))
    }

    pub fn reference(&self) -> &ReferenceStore {
        &self.reference
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Upcoming matches, one row each, odds pivoted into label columns
    pub async fn program(&self, now: DateTime<Utc>) -> Result<Vec<ProgramRow>> {
        let matches = self.reference.upcoming_matches(now).await?;
        let codes: Vec<i64> = matches.iter().map(|m| m.game.odd_match_code).collect();
        let odds = self.reference.odds_for_matches(&codes).await?;
        let mut wide = pivot_odds(&odds)?;

        let program = matches
            .into_iter()
            .map(|m| ProgramRow {
                odds: wide.remove(&m.game.odd_match_code).unwrap_or_default(),
                odd_match_code: m.game.odd_match_code,
                match_date: m.game.match_date,
                competition_name: m.competition_name,
                description: m.game.description,
                home_team: m.game.home_team,
                away_team: m.game.away_team,
            })
            .collect();
        Ok(program)
    }

    /// Bet lists whose outcome is not knowable yet
    pub async fn on_going_bet_lists(&self, now: DateTime<Utc>) -> Result<Vec<BetList>> {
        self.local.on_going_bet_lists(now).await
    }

    /// One bet list with its odds resolved against the reference snapshot.
    /// Fails when the name is unknown or none of its odds can be found.
    pub async fn bet_list_detail(&self, name: &str) -> Result<BetListDetail> {
        let bet_list = self.local.bet_list(name).await?;
        let odds = self.reference.odd_details(&bet_list.odds).await?;

        if odds.is_empty() {
            return Err(Error::odds_not_found(&bet_list.odds));
        }
        if odds.len() < bet_list.odds.len() {
            warn!(
                "Bet list '{}': {} of {} odds missing from the reference database",
                name,
                bet_list.odds.len() - odds.len(),
                bet_list.odds.len()
            );
        }

        Ok(BetListDetail { bet_list, odds })
    }

    /// One row per (bet list, odd) for lists whose last match has kicked off
    pub async fn resolved_odds(&self, now: DateTime<Utc>) -> Result<Vec<ResolvedOdd>> {
        let lists = self.local.at_term_bet_lists(now).await?;

        let mut seen = HashSet::new();
        let keys: Vec<String> = lists
            .iter()
            .flat_map(|l| l.odds.iter())
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();

        let details: HashMap<String, OddDetail> = self
            .reference
            .odd_details(&keys)
            .await?
            .into_iter()
            .map(|d| (d.key.clone(), d))
            .collect();

        let mut rows = Vec::new();
        for list in &lists {
            let mut odds: Vec<&OddDetail> = Vec::with_capacity(list.odds.len());
            for key in &list.odds {
                match details.get(key) {
                    Some(detail) => odds.push(detail),
                    None => warn!("Bet list '{}': odd {} not in the reference database", list.bet_list_name, key),
                }
            }
            odds.sort_by_key(|d| (d.match_datetime, d.odd_match_code));
            rows.extend(odds.into_iter().map(|odd| ResolvedOdd {
                bet_list_name: list.bet_list_name.clone(),
                odd: odd.clone(),
            }));
        }

        debug!("{} resolved odds across {} bet lists", rows.len(), lists.len());
        Ok(rows)
    }

    /// Resolved odds grouped per bet list
    pub async fn resolved_bet_lists(&self, now: DateTime<Utc>) -> Result<Vec<ResolvedBetList>> {
        Ok(group_resolved(self.resolved_odds(now).await?))
    }

    pub async fn win_lose_count(&self, now: DateTime<Utc>) -> Result<WinLoseCount> {
        Ok(WinLoseCount::from_lists(&self.resolved_bet_lists(now).await?))
    }

    /// Run free-form SQL. Diagnostic only: the statement is executed as is.
    pub async fn raw_query(&self, source: Source, sql: &str) -> Result<Table> {
        debug!("Diagnostic query on {}: {}", source, sql);

        let rows = match source {
            Source::Reference => sqlx::query(sql).fetch_all(self.reference.pool()).await?,
            Source::Local => sqlx::query(sql).fetch_all(&self.local.pool().await).await?,
            Source::Combined => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
                let mut conn = SqliteConnection::connect_with(&options).await?;
                sqlx::query("ATTACH DATABASE ? AS odds_db")
                    .bind(self.reference.path().to_string_lossy().into_owned())
                    .execute(&mut conn)
                    .await?;
                sqlx::query("ATTACH DATABASE ? AS local_db")
                    .bind(self.local.path().to_string_lossy().into_owned())
                    .execute(&mut conn)
                    .await?;
                let rows = sqlx::query(sql).fetch_all(&mut conn).await;
                conn.close().await?;
                rows?
            }
        };

        rows_to_table(&rows)
    }
}

/// Group consecutive rows of the same bet list
fn group_resolved(rows: Vec<ResolvedOdd>) -> Vec<ResolvedBetList> {
    let mut lists: Vec<ResolvedBetList> = Vec::new();
    for row in rows {
        match lists.last_mut() {
            Some(list) if list.bet_list_name == row.bet_list_name => list.odds.push(row.odd),
            _ => lists.push(ResolvedBetList {
                bet_list_name: row.bet_list_name,
                odds: vec![row.odd],
            }),
        }
    }
    lists
}

fn rows_to_table(rows: &[SqliteRow]) -> Result<Table> {
    let Some(first) = rows.first() else {
        return Ok(Table::default());
    };

    let columns = first.columns().iter().map(|c| c.name().to_string()).collect();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| cell(row, i)).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;

    Ok(Table { columns, rows })
}

/// Decode one cell by its storage class
fn cell(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::String(BASE64.encode(row.try_get_unchecked::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{odd_key, ReferenceFixture};
    use crate::types::OddLabel;

    async fn layer(fixture: &ReferenceFixture) -> QueryLayer {
        QueryLayer::new(
            Arc::new(fixture.open().await),
            Arc::new(fixture.local_store().await),
        )
    }

    async fn save(layer: &QueryLayer, name: &str, keys: &[(i64, &str)]) {
        let keys: Vec<String> = keys.iter().map(|(c, l)| odd_key(*c, l)).collect();
        let odds = layer.reference().odd_details(&keys).await.unwrap();
        layer.local().upsert_bet_list(name, &odds).await.unwrap();
    }

    #[tokio::test]
    async fn test_program_is_wide_with_null_cells() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;

        let program = layer.program(fixture.now).await.unwrap();
        assert_eq!(program.len(), 2);

        let lille = &program[0];
        assert_eq!(lille.odd_match_code, 3);
        assert_eq!(lille.competition_name.as_deref(), Some("Ligue 1"));
        assert_eq!(lille.odds.get(OddLabel::parse("X").unwrap()), Some(3.2));
        assert_eq!(lille.odds.get(OddLabel::parse("+ 1.5 go.").unwrap()), Some(1.3));
        assert_eq!(lille.odds.get(OddLabel::parse("X2").unwrap()), None);

        let chelsea = &program[1];
        assert_eq!(chelsea.odds.populated().count(), 2);
    }

    #[tokio::test]
    async fn test_upsert_then_detail_returns_saved_odds() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;
        save(&layer, "combo", &[(4, "X2"), (3, "1")]).await;

        let detail = layer.bet_list_detail("combo").await.unwrap();
        let mut keys: Vec<String> = detail.odds.iter().map(|o| o.key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec![odd_key(3, "1"), odd_key(4, "X2")]);
        assert_eq!(detail.bet_list.earliest_match_date, detail.odds[0].match_datetime);
        assert_eq!(detail.bet_list.latest_match_date, detail.odds[1].match_datetime);
    }

    #[tokio::test]
    async fn test_detail_of_unknown_name_fails() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;
        assert!(matches!(
            layer.bet_list_detail("nobody").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolved_lists_win_only_when_every_odd_wins() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;
        save(&layer, "lucky", &[(1, "1"), (2, "X"), (1, "- 2.5 go.")]).await;
        save(&layer, "unlucky", &[(1, "1"), (2, "X"), (2, "2")]).await;
        save(&layer, "later", &[(1, "1"), (3, "1")]).await;

        let rows = layer.resolved_odds(fixture.now).await.unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.bet_list_name != "later"));

        let lists = layer.resolved_bet_lists(fixture.now).await.unwrap();
        let outcome: Vec<(&str, bool)> = lists
            .iter()
            .map(|l| (l.bet_list_name.as_str(), l.is_winning()))
            .collect();
        assert!(outcome.contains(&("lucky", true)));
        assert!(outcome.contains(&("unlucky", false)));

        let unlucky = lists.iter().find(|l| l.bet_list_name == "unlucky").unwrap();
        assert_eq!(unlucky.losing_count(), 1);
        assert_eq!(unlucky.match_count(), 3);

        let counts = layer.win_lose_count(fixture.now).await.unwrap();
        assert_eq!(counts, WinLoseCount { winning: 1, losing: 1 });

        let on_going = layer.on_going_bet_lists(fixture.now).await.unwrap();
        assert_eq!(on_going.len(), 1);
        assert_eq!(on_going[0].bet_list_name, "later");
    }

    #[tokio::test]
    async fn test_deleted_list_leaves_every_view() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;
        save(&layer, "old", &[(1, "1")]).await;
        save(&layer, "new", &[(3, "1")]).await;

        layer.local().delete_bet_list("old").await.unwrap();
        layer.local().delete_bet_list("new").await.unwrap();

        assert!(layer.resolved_bet_lists(fixture.now).await.unwrap().is_empty());
        assert!(layer.on_going_bet_lists(fixture.now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_query_on_every_source() {
        let fixture = ReferenceFixture::standard().await;
        let layer = layer(&fixture).await;
        save(&layer, "diag", &[(3, "1")]).await;

        let reference = layer
            .raw_query(Source::Reference, "SELECT odd_match_code, odd_value, odd_threshold FROM odds WHERE key = 'm3-1'")
            .await
            .unwrap();
        assert_eq!(reference.columns, vec!["odd_match_code", "odd_value", "odd_threshold"]);
        assert_eq!(reference.rows, vec![vec![Value::from(3), Value::from(2.0), Value::Null]]);

        let local = layer
            .raw_query(Source::Local, "SELECT bet_list_name FROM bet_lists")
            .await
            .unwrap();
        assert_eq!(local.rows, vec![vec![Value::from("diag")]]);

        let combined = layer
            .raw_query(
                Source::Combined,
                r#"
                SELECT b.bet_list_name, o.odd_name
                FROM local_db.bet_lists b, json_each(b.odds) j
                JOIN odds_db.odds o ON o.key = j.value
                "#,
            )
            .await
            .unwrap();
        assert_eq!(combined.rows, vec![vec![Value::from("diag"), Value::from("1")]]);
    }

    #[tokio::test]
    async fn test_open_settles_migrated_lists() {
        let fixture = ReferenceFixture::standard().await;
        let path = fixture.dir.path().join("legacy.db");

        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let legacy = sqlx::SqlitePool::connect_with(options).await.unwrap();
        for statement in [
            "CREATE TABLE bet_lists (bet_list_name TEXT PRIMARY KEY, creation_date TEXT NOT NULL, modification_date TEXT NOT NULL)",
            "CREATE TABLE bet_lists__bet_list_odds (bet_list_name TEXT, odd_key TEXT)",
            "INSERT INTO bet_lists VALUES ('saturday', '2024-06-01 11:00:00.000000', '2024-06-01 11:00:00.000000')",
            "INSERT INTO bet_lists__bet_list_odds VALUES ('saturday', 'm3-1'), ('saturday', 'm4-1')",
        ] {
            sqlx::query(statement).execute(&legacy).await.unwrap();
        }
        legacy.close().await;

        let layer = QueryLayer::open(
            Arc::new(fixture.open().await),
            Arc::new(LocalStore::open(&path).await.unwrap()),
        )
        .await
        .unwrap();

        let on_going = layer.on_going_bet_lists(fixture.now).await.unwrap();
        assert_eq!(on_going.len(), 1);
        assert_eq!(on_going[0].earliest_match_date, crate::types::parse_timestamp("2024-06-02 19:00:00").unwrap());
        assert_eq!(on_going[0].latest_match_date, crate::types::parse_timestamp("2024-06-03 16:30:00").unwrap());
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("Combined".parse::<Source>().unwrap(), Source::Combined);
        assert_eq!("sporacle".parse::<Source>().unwrap(), Source::Reference);
        assert!("mongo".parse::<Source>().is_err());
    }
}
