//! Temporary databases shared by the unit tests

use crate::db::LocalStore;
use crate::reference::{create_schema, ReferenceStore};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;
use tempfile::TempDir;

/// A reference snapshot written to a temporary directory.
///
/// Matches 1 and 2 are played (odds carry win flags), 3 and 4 are upcoming
/// relative to `now`.
pub struct ReferenceFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub now: DateTime<Utc>,
}

impl ReferenceFixture {
    pub async fn standard() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();

        for (code, name, top) in [("L1", "Ligue 1", true), ("PL", "Premier League", true)] {
            sqlx::query("INSERT INTO competitions (competition_code, name, is_top_flight) VALUES (?, ?, ?)")
                .bind(code)
                .bind(name)
                .bind(top)
                .execute(&pool)
                .await
                .unwrap();
        }

        let matches: [(i64, &str, &str, &str, Option<(i64, i64)>); 4] = [
            (1, "L1", "2024-05-20 20:00:00", "Lyon - Nantes", Some((2, 0))),
            (2, "PL", "2024-05-25 15:00:00", "Arsenal - Everton", Some((1, 1))),
            (3, "L1", "2024-06-02 19:00:00", "Lille - Nice", None),
            (4, "PL", "2024-06-03 16:30:00", "Chelsea - Fulham", None),
        ];
        for (code, competition, date, description, score) in matches {
            let (home, away) = description.split_once(" - ").unwrap();
            sqlx::query(
                r#"
                INSERT INTO matches (odd_match_code, competition_code, match_date, description, home_team, away_team, home_ft_goals, away_ft_goals)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(code)
            .bind(competition)
            .bind(date)
            .bind(description)
            .bind(home)
            .bind(away)
            .bind(score.map(|s| s.0))
            .bind(score.map(|s| s.1))
            .execute(&pool)
            .await
            .unwrap();
        }

        let odds: [(i64, &str, f64, Option<f64>, Option<bool>); 15] = [
            (1, "1", 1.5, None, Some(true)),
            (1, "X", 3.8, None, Some(false)),
            (1, "2", 5.0, None, Some(false)),
            (1, "+ 2.5 go.", 2.1, Some(2.5), Some(false)),
            (1, "- 2.5 go.", 1.7, Some(2.5), Some(true)),
            (2, "1", 1.6, None, Some(false)),
            (2, "X", 4.0, None, Some(true)),
            (2, "2", 5.5, None, Some(false)),
            (2, "1X", 1.2, None, Some(true)),
            (3, "1", 2.0, None, None),
            (3, "X", 3.2, None, None),
            (3, "2", 3.6, None, None),
            (3, "+ 1.5 go.", 1.3, Some(1.5), None),
            (4, "1", 1.9, None, None),
            (4, "X2", 1.8, None, None),
        ];
        for (code, label, value, threshold, is_winning) in odds {
            sqlx::query(
                "INSERT INTO odds (key, odd_match_code, odd_name, odd_value, odd_threshold, is_winning) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(odd_key(code, label))
            .bind(code)
            .bind(label)
            .bind(value)
            .bind(threshold)
            .bind(is_winning)
            .execute(&pool)
            .await
            .unwrap();
        }

        pool.close().await;

        Self {
            dir,
            path,
            now: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    pub async fn open(&self) -> ReferenceStore {
        ReferenceStore::open(&self.path).await.unwrap()
    }

    /// A fresh local store next to the snapshot
    pub async fn local_store(&self) -> LocalStore {
        LocalStore::open(self.dir.path().join("local.database.db"))
            .await
            .unwrap()
    }
}

/// Key used by the fixture for an odd: `m<match>-<label>`
pub fn odd_key(match_code: i64, label: &str) -> String {
    format!("m{}-{}", match_code, label)
}
