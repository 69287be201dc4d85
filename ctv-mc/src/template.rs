//! Round template model and storage
//!
//! A round template describes one round's structure. Exercise assignments are
//! the live list of exercises placed in the round's slots; several exercises
//! may share a slot (stations).

use ctv_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Round structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundType {
    Circuit,
    Stations,
    Amrap,
}

impl RoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundType::Circuit => "circuit",
            RoundType::Stations => "stations",
            RoundType::Amrap => "amrap",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "circuit" => Some(RoundType::Circuit),
            "stations" => Some(RoundType::Stations),
            "amrap" => Some(RoundType::Amrap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTemplate {
    /// 1-based, unique within a workout
    pub round_number: u32,
    pub round_type: RoundType,
    #[serde(default)]
    pub exercises_per_round: u32,
    #[serde(default)]
    pub work_duration_sec: f64,
    #[serde(default)]
    pub rest_duration_sec: f64,
    /// Number of sets, at least 1
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    /// Total length of an AMRAP round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amrap_duration_sec: Option<f64>,
}

fn default_repeat_count() -> u32 {
    1
}

impl RoundTemplate {
    pub fn validate(&self) -> Result<()> {
        if self.round_number == 0 {
            return Err(Error::InvalidInput("round number is 1-based".to_string()));
        }
        if self.repeat_count == 0 {
            return Err(Error::InvalidInput(format!(
                "round {}: repeat count must be at least 1",
                self.round_number
            )));
        }
        if self.work_duration_sec < 0.0 || self.rest_duration_sec < 0.0 {
            return Err(Error::InvalidInput(format!(
                "round {}: durations must not be negative",
                self.round_number
            )));
        }
        Ok(())
    }

    pub fn has_multiple_sets(&self) -> bool {
        self.repeat_count > 1
    }
}

/// One exercise placed in a round slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseAssignment {
    pub order_index: u32,
    pub exercise_name: String,
}

/// Everything the engine needs to reason about one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPlan {
    pub template: RoundTemplate,
    #[serde(default)]
    pub exercises: Vec<ExerciseAssignment>,
}

/// Round templates and exercise assignments in SQLite
#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace a round's template and its exercise assignments
    pub async fn save_round(&self, session_id: &str, plan: &RoundPlan) -> Result<()> {
        plan.template.validate()?;
        let template = &plan.template;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO round_templates (
                session_id, round_number, round_type, exercises_per_round,
                work_duration_sec, rest_duration_sec, repeat_count, amrap_duration_sec
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id, round_number) DO UPDATE SET
                round_type = excluded.round_type,
                exercises_per_round = excluded.exercises_per_round,
                work_duration_sec = excluded.work_duration_sec,
                rest_duration_sec = excluded.rest_duration_sec,
                repeat_count = excluded.repeat_count,
                amrap_duration_sec = excluded.amrap_duration_sec
            "#,
        )
        .bind(session_id)
        .bind(template.round_number as i64)
        .bind(template.round_type.as_str())
        .bind(template.exercises_per_round as i64)
        .bind(template.work_duration_sec)
        .bind(template.rest_duration_sec)
        .bind(template.repeat_count as i64)
        .bind(template.amrap_duration_sec)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM round_exercises WHERE session_id = ? AND round_number = ?")
            .bind(session_id)
            .bind(template.round_number as i64)
            .execute(&mut *tx)
            .await?;

        for exercise in &plan.exercises {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO round_exercises (session_id, round_number, order_index, exercise_name)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(template.round_number as i64)
            .bind(exercise.order_index as i64)
            .bind(&exercise.exercise_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// All round templates of a session, ordered by round number
    pub async fn list_templates(&self, session_id: &str) -> Result<Vec<RoundTemplate>> {
        let rows = sqlx::query(
            r#"
            SELECT round_number, round_type, exercises_per_round, work_duration_sec,
                   rest_duration_sec, repeat_count, amrap_duration_sec
            FROM round_templates
            WHERE session_id = ?
            ORDER BY round_number
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(template_from_row).collect()
    }

    /// Number of rounds in the session's workout
    pub async fn total_rounds(&self, session_id: &str) -> Result<u32> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(round_number) FROM round_templates WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0).max(0) as u32)
    }

    /// Template plus live exercise list for one round
    pub async fn load_round(&self, session_id: &str, round_number: u32) -> Result<Option<RoundPlan>> {
        let row = sqlx::query(
            r#"
            SELECT round_number, round_type, exercises_per_round, work_duration_sec,
                   rest_duration_sec, repeat_count, amrap_duration_sec
            FROM round_templates
            WHERE session_id = ? AND round_number = ?
            "#,
        )
        .bind(session_id)
        .bind(round_number as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let template = template_from_row(&row)?;

        let exercise_rows = sqlx::query(
            r#"
            SELECT order_index, exercise_name
            FROM round_exercises
            WHERE session_id = ? AND round_number = ?
            ORDER BY order_index, exercise_name
            "#,
        )
        .bind(session_id)
        .bind(round_number as i64)
        .fetch_all(&self.pool)
        .await?;

        let exercises = exercise_rows
            .iter()
            .map(|r| ExerciseAssignment {
                order_index: r.get::<i64, _>("order_index").max(0) as u32,
                exercise_name: r.get("exercise_name"),
            })
            .collect();

        Ok(Some(RoundPlan {
            template,
            exercises,
        }))
    }
}

fn template_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RoundTemplate> {
    let round_type: String = row.get("round_type");
    let round_type = RoundType::parse(&round_type)
        .ok_or_else(|| Error::Internal(format!("Unknown round type in database: {}", round_type)))?;

    Ok(RoundTemplate {
        round_number: row.get::<i64, _>("round_number") as u32,
        round_type,
        exercises_per_round: row.get::<i64, _>("exercises_per_round").max(0) as u32,
        work_duration_sec: row.get("work_duration_sec"),
        rest_duration_sec: row.get("rest_duration_sec"),
        repeat_count: row.get::<i64, _>("repeat_count").max(1) as u32,
        amrap_duration_sec: row.get("amrap_duration_sec"),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use ctv_common::db::init::init_memory_database;

    #[test]
    fn test_validate_rejects_zero_repeat() {
        let mut template = circuit(1, 4, 45.0, 15.0, 1);
        assert!(template.validate().is_ok());

        template.repeat_count = 0;
        assert!(matches!(template.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_round_type_serializes_lowercase() {
        let json = serde_json::to_string(&RoundType::Stations).unwrap();
        assert_eq!(json, "\"stations\"");
    }

    #[tokio::test]
    async fn test_save_and_load_round() {
        let pool = init_memory_database().await.unwrap();
        let store = TemplateStore::new(pool);

        let plan = RoundPlan {
            template: circuit(1, 3, 40.0, 20.0, 2),
            exercises: named(&["Squat", "Row", "Plank"]),
        };
        store.save_round("s1", &plan).await.unwrap();

        let loaded = store.load_round("s1", 1).await.unwrap().unwrap();
        assert_eq!(loaded, plan);
        assert!(store.load_round("s1", 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_total_rounds_and_listing() {
        let pool = init_memory_database().await.unwrap();
        let store = TemplateStore::new(pool);

        assert_eq!(store.total_rounds("s1").await.unwrap(), 0);

        for round in [2, 1, 3] {
            let plan = RoundPlan {
                template: circuit(round, 2, 30.0, 10.0, 1),
                exercises: vec![],
            };
            store.save_round("s1", &plan).await.unwrap();
        }

        assert_eq!(store.total_rounds("s1").await.unwrap(), 3);
        let numbers: Vec<u32> = store
            .list_templates("s1")
            .await
            .unwrap()
            .iter()
            .map(|t| t.round_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
