//! SQLite-backed track library

use async_trait::async_trait;
use ctv_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::{sort_tracks, Energy, Segment, Track, TrackFilter, TrackLibrary};

/// Track catalog stored in the `tracks` and `track_segments` tables
#[derive(Clone)]
pub struct SqliteTrackLibrary {
    pool: SqlitePool,
}

impl SqliteTrackLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a track together with all of its segments
    pub async fn upsert_track(&self, track: &Track) -> Result<()> {
        let mut track = track.clone();
        track.normalize()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tracks (id, name, artist, duration_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                artist = excluded.artist,
                duration_ms = excluded.duration_ms
            "#,
        )
        .bind(&track.id)
        .bind(&track.name)
        .bind(&track.artist)
        .bind(track.duration_ms as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM track_segments WHERE track_id = ?")
            .bind(&track.id)
            .execute(&mut *tx)
            .await?;

        for segment in &track.segments {
            sqlx::query(
                r#"
                INSERT INTO track_segments (track_id, timestamp_sec, energy, buildup_duration_sec)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&track.id)
            .bind(segment.timestamp_sec)
            .bind(segment.energy.as_str())
            .bind(segment.buildup_duration_sec)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_segments(&self, track_id: Option<&str>) -> Result<HashMap<String, Vec<Segment>>> {
        let rows = match track_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    SELECT track_id, timestamp_sec, energy, buildup_duration_sec
                    FROM track_segments
                    WHERE track_id = ?
                    ORDER BY timestamp_sec
                    "#,
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT track_id, timestamp_sec, energy, buildup_duration_sec
                    FROM track_segments
                    ORDER BY track_id, timestamp_sec
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut segments: HashMap<String, Vec<Segment>> = HashMap::new();
        for row in rows {
            let energy: String = row.get("energy");
            let energy = Energy::parse(&energy).ok_or_else(|| {
                Error::Internal(format!("Unknown segment energy in database: {}", energy))
            })?;

            segments
                .entry(row.get("track_id"))
                .or_default()
                .push(Segment {
                    timestamp_sec: row.get("timestamp_sec"),
                    energy,
                    buildup_duration_sec: row.get("buildup_duration_sec"),
                });
        }

        Ok(segments)
    }
}

fn track_from_row(row: &sqlx::sqlite::SqliteRow, segments: Vec<Segment>) -> Track {
    Track {
        id: row.get("id"),
        name: row.get("name"),
        artist: row.get("artist"),
        duration_ms: row.get::<i64, _>("duration_ms").max(0) as u64,
        segments,
    }
}

#[async_trait]
impl TrackLibrary for SqliteTrackLibrary {
    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>> {
        let rows = sqlx::query("SELECT id, name, artist, duration_ms FROM tracks")
            .fetch_all(&self.pool)
            .await?;

        let mut segments = self.load_segments(None).await?;

        let mut tracks: Vec<Track> = rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let track_segments = segments.remove(&id).unwrap_or_default();
                track_from_row(row, track_segments)
            })
            .filter(|t| filter.matches(t))
            .collect();

        sort_tracks(&mut tracks);
        Ok(tracks)
    }

    async fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT id, name, artist, duration_ms FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut segments = self.load_segments(Some(id)).await?;
                let track_segments = segments.remove(id).unwrap_or_default();
                Ok(Some(track_from_row(&row, track_segments)))
            }
            None => Ok(None),
        }
    }
}
