//! Round music configuration persistence
//!
//! Key-value storage of one [`RoundMusicConfig`] per (session, round), always
//! written as a whole-round snapshot. `put_many` writes several rounds in one
//! transaction so a cross-round cascade is never half-persisted.

use async_trait::async_trait;
use ctv_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::triggers::{RoundMusicConfig, WorkoutMusic};

#[async_trait]
pub trait MusicConfigGateway: Send + Sync {
    async fn get(&self, session_id: &str, round_number: u32) -> Result<Option<RoundMusicConfig>>;

    /// Every stored round of a session
    async fn get_all(&self, session_id: &str) -> Result<WorkoutMusic>;

    /// Full-round replace
    async fn put(&self, session_id: &str, round_number: u32, config: &RoundMusicConfig) -> Result<()>;

    /// Replace several rounds atomically
    async fn put_many(&self, session_id: &str, configs: &[(u32, RoundMusicConfig)]) -> Result<()>;
}

/// Gateway over the `round_music_config` table
#[derive(Clone)]
pub struct SqliteMusicConfigGateway {
    pool: SqlitePool,
}

impl SqliteMusicConfigGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode(session_id: &str, round_number: u32, json: &str) -> Result<RoundMusicConfig> {
    serde_json::from_str(json).map_err(|e| {
        Error::Internal(format!(
            "Failed to deserialize music config for {} round {}: {}",
            session_id, round_number, e
        ))
    })
}

#[async_trait]
impl MusicConfigGateway for SqliteMusicConfigGateway {
    async fn get(&self, session_id: &str, round_number: u32) -> Result<Option<RoundMusicConfig>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT config FROM round_music_config WHERE session_id = ? AND round_number = ?",
        )
        .bind(session_id)
        .bind(round_number as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(json,)| decode(session_id, round_number, &json))
            .transpose()
    }

    async fn get_all(&self, session_id: &str) -> Result<WorkoutMusic> {
        let rows = sqlx::query(
            "SELECT round_number, config FROM round_music_config WHERE session_id = ? ORDER BY round_number",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut workout = WorkoutMusic::new();
        for row in rows {
            let round_number = row.get::<i64, _>("round_number") as u32;
            let json: String = row.get("config");
            workout.insert(round_number, decode(session_id, round_number, &json)?);
        }
        Ok(workout)
    }

    async fn put(&self, session_id: &str, round_number: u32, config: &RoundMusicConfig) -> Result<()> {
        self.put_many(session_id, &[(round_number, config.clone())])
            .await
    }

    async fn put_many(&self, session_id: &str, configs: &[(u32, RoundMusicConfig)]) -> Result<()> {
        // Serialize everything before opening the transaction
        let encoded = configs
            .iter()
            .map(|(round, config)| -> Result<(u32, String)> {
                Ok((*round, serde_json::to_string(config)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let updated_at = ctv_common::time::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        for (round_number, json) in &encoded {
            sqlx::query(
                r#"
                INSERT INTO round_music_config (session_id, round_number, config, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(session_id, round_number) DO UPDATE SET
                    config = excluded.config,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(session_id)
            .bind(*round_number as i64)
            .bind(json)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

/// Gateway held in memory
#[derive(Default)]
pub struct InMemoryMusicConfigGateway {
    rounds: Mutex<HashMap<(String, u32), RoundMusicConfig>>,
}

impl InMemoryMusicConfigGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, u32), RoundMusicConfig>>> {
        self.rounds
            .lock()
            .map_err(|_| Error::Internal("music config store lock poisoned".to_string()))
    }
}

#[async_trait]
impl MusicConfigGateway for InMemoryMusicConfigGateway {
    async fn get(&self, session_id: &str, round_number: u32) -> Result<Option<RoundMusicConfig>> {
        Ok(self
            .lock()?
            .get(&(session_id.to_string(), round_number))
            .cloned())
    }

    async fn get_all(&self, session_id: &str) -> Result<WorkoutMusic> {
        Ok(self
            .lock()?
            .iter()
            .filter(|((session, _), _)| session == session_id)
            .map(|((_, round), config)| (*round, config.clone()))
            .collect())
    }

    async fn put(&self, session_id: &str, round_number: u32, config: &RoundMusicConfig) -> Result<()> {
        self.lock()?
            .insert((session_id.to_string(), round_number), config.clone());
        Ok(())
    }

    async fn put_many(&self, session_id: &str, configs: &[(u32, RoundMusicConfig)]) -> Result<()> {
        let mut rounds = self.lock()?;
        for (round_number, config) in configs {
            rounds.insert((session_id.to_string(), *round_number), config.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::PhaseType;
    use ctv_common::db::init::init_memory_database;

    fn sample(enabled: bool) -> RoundMusicConfig {
        let mut config = RoundMusicConfig::default();
        config.slot_mut(PhaseType::Exercise, 1).enabled = enabled;
        config
    }

    #[tokio::test]
    async fn test_sqlite_put_get_replace() {
        let gateway = SqliteMusicConfigGateway::new(init_memory_database().await.unwrap());

        assert!(gateway.get("s1", 1).await.unwrap().is_none());

        gateway.put("s1", 1, &sample(true)).await.unwrap();
        assert_eq!(gateway.get("s1", 1).await.unwrap(), Some(sample(true)));

        gateway.put("s1", 1, &sample(false)).await.unwrap();
        assert_eq!(gateway.get("s1", 1).await.unwrap(), Some(sample(false)));
    }

    #[tokio::test]
    async fn test_sqlite_put_many_and_get_all() {
        let gateway = SqliteMusicConfigGateway::new(init_memory_database().await.unwrap());

        gateway
            .put_many("s1", &[(1, sample(true)), (2, sample(false))])
            .await
            .unwrap();
        gateway.put("other", 1, &sample(true)).await.unwrap();

        let workout = gateway.get_all("s1").await.unwrap();
        assert_eq!(workout.len(), 2);
        assert_eq!(workout.get(&2), Some(&sample(false)));
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_document_is_error() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO round_music_config (session_id, round_number, config, updated_at) VALUES ('s1', 1, 'not json', '')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let gateway = SqliteMusicConfigGateway::new(pool);
        assert!(matches!(gateway.get("s1", 1).await, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_in_memory_gateway_scopes_by_session() {
        let gateway = InMemoryMusicConfigGateway::new();
        gateway
            .put_many("s1", &[(1, sample(true)), (3, sample(true))])
            .await
            .unwrap();
        gateway.put("s2", 1, &sample(false)).await.unwrap();

        let s1 = gateway.get_all("s1").await.unwrap();
        assert_eq!(s1.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(gateway.get("s2", 1).await.unwrap(), Some(sample(false)));
    }
}
