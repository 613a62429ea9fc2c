use chrono::{NaiveDateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::models::{Match, MatchResult, Prediction};
use crate::services::data_cleaner::parse_match_date;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

pub async fn init_database(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER,
            away_goals INTEGER,
            result TEXT,
            UNIQUE (match_date, home_team, away_team)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            match_date TEXT NOT NULL,
            away_win_probability REAL NOT NULL,
            draw_probability REAL NOT NULL,
            home_win_probability REAL NOT NULL,
            predicted_outcome TEXT NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_team)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_team)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

/// Replace the stored history with `matches`. Duplicate (date, home, away)
/// keys after the first are ignored. Returns the number of rows stored.
pub async fn replace_matches(pool: &SqlitePool, matches: &[Match]) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM matches").execute(&mut *tx).await?;

    let mut stored = 0;
    for m in matches {
        let done = sqlx::query(
            r#"
            INSERT OR IGNORE INTO matches
            (match_date, home_team, away_team, home_goals, away_goals, result)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(m.match_date.format(DATE_FORMAT).to_string())
        .bind(&m.home_team)
        .bind(&m.away_team)
        .bind(m.home_goals.map(i64::from))
        .bind(m.away_goals.map(i64::from))
        .bind(m.result.map(MatchResult::code))
        .execute(&mut *tx)
        .await?;
        stored += done.rows_affected();
    }

    tx.commit().await?;
    tracing::info!("Stored {} matches", stored);
    Ok(stored)
}

fn match_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Match> {
    let goals = |column: &str| -> Option<u32> {
        row.get::<Option<i64>, _>(column).and_then(|g| u32::try_from(g).ok())
    };
    let result = match row.get::<Option<String>, _>("result") {
        Some(code) => Some(code.parse::<MatchResult>()?),
        None => None,
    };

    Ok(Match {
        match_date: parse_match_date(&row.get::<String, _>("match_date"))?,
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        home_goals: goals("home_goals"),
        away_goals: goals("away_goals"),
        result,
    })
}

/// The whole stored history, oldest first.
pub async fn get_all_matches(pool: &SqlitePool) -> Result<Vec<Match>> {
    let rows = sqlx::query("SELECT * FROM matches ORDER BY match_date ASC, id ASC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(match_from_row).collect()
}

/// A team's most recent matches played strictly before `before`, newest first.
pub async fn get_team_matches(pool: &SqlitePool, team: &str, before: NaiveDateTime, limit: i64) -> Result<Vec<Match>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM matches
        WHERE (home_team = ? OR away_team = ?) AND match_date < ?
        ORDER BY match_date DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(team)
    .bind(team)
    .bind(before.format(DATE_FORMAT).to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(match_from_row).collect()
}

pub async fn get_team_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT home_team AS name FROM matches UNION SELECT away_team AS name FROM matches ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get("name")).collect())
}

pub async fn insert_prediction(pool: &SqlitePool, prediction: &Prediction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO predictions
        (id, home_team, away_team, match_date, away_win_probability, draw_probability,
         home_win_probability, predicted_outcome, model_version, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&prediction.id)
    .bind(&prediction.home_team)
    .bind(&prediction.away_team)
    .bind(prediction.match_date.format(DATE_FORMAT).to_string())
    .bind(prediction.away_win_probability)
    .bind(prediction.draw_probability)
    .bind(prediction.home_win_probability)
    .bind(&prediction.predicted_outcome)
    .bind(&prediction.model_version)
    .bind(prediction.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_recent_predictions(pool: &SqlitePool, limit: i64) -> Result<Vec<Prediction>> {
    let rows = sqlx::query("SELECT * FROM predictions ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut predictions = Vec::new();
    for row in rows {
        let match_date: NaiveDateTime = parse_match_date(&row.get::<String, _>("match_date"))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
            .map_err(|e| PipelineError::InvalidDate(e.to_string()))?
            .with_timezone(&Utc);

        predictions.push(Prediction {
            id: row.get("id"),
            home_team: row.get("home_team"),
            away_team: row.get("away_team"),
            match_date,
            away_win_probability: row.get("away_win_probability"),
            draw_probability: row.get("draw_probability"),
            home_win_probability: row.get("home_win_probability"),
            predicted_outcome: row.get("predicted_outcome"),
            model_version: row.get("model_version"),
            created_at,
        });
    }

    Ok(predictions)
}
