//! Database initialization
//!
//! Creates the database on first run and applies the schema idempotently
//! (`CREATE TABLE IF NOT EXISTS`), so it is safe to call on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database with the full schema
///
/// Single connection: every handle must see the same in-memory file.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL lets the TV display read while an editor saves
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_tracks_table(pool).await?;
    create_track_segments_table(pool).await?;
    create_round_templates_table(pool).await?;
    create_round_exercises_table(pool).await?;
    create_round_music_config_table(pool).await?;
    Ok(())
}

async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            artist TEXT NOT NULL DEFAULT '',
            duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_track_segments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_segments (
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            timestamp_sec REAL NOT NULL CHECK (timestamp_sec >= 0),
            energy TEXT NOT NULL CHECK (energy IN ('low', 'medium', 'high')),
            buildup_duration_sec REAL,
            PRIMARY KEY (track_id, timestamp_sec)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_round_templates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS round_templates (
            session_id TEXT NOT NULL,
            round_number INTEGER NOT NULL CHECK (round_number >= 1),
            round_type TEXT NOT NULL CHECK (round_type IN ('circuit', 'stations', 'amrap')),
            exercises_per_round INTEGER NOT NULL DEFAULT 0,
            work_duration_sec REAL NOT NULL DEFAULT 0,
            rest_duration_sec REAL NOT NULL DEFAULT 0,
            repeat_count INTEGER NOT NULL DEFAULT 1 CHECK (repeat_count >= 1),
            amrap_duration_sec REAL,
            PRIMARY KEY (session_id, round_number)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_round_exercises_table(pool: &SqlitePool) -> Result<()> {
    // Several clients may share one slot (stations), so order_index repeats
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS round_exercises (
            session_id TEXT NOT NULL,
            round_number INTEGER NOT NULL,
            order_index INTEGER NOT NULL,
            exercise_name TEXT NOT NULL,
            PRIMARY KEY (session_id, round_number, order_index, exercise_name)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_round_music_config_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS round_music_config (
            session_id TEXT NOT NULL,
            round_number INTEGER NOT NULL,
            config TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (session_id, round_number)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
