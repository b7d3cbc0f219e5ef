// src/roster/store.rs

//! SQLite persistence for characters, weekly schedules, and matches.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::from_unix;
use crate::schedule::WeeklySchedule;

use super::{Character, Match, MatchStatus};

pub struct RosterStore {
    pool: SqlitePool,
}

impl RosterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Characters
    // ========================================================================

    pub async fn create_character(
        &self,
        name: &str,
        persona: &str,
        mood: Option<&str>,
    ) -> Result<Character> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mood = mood.unwrap_or("neutral");

        sqlx::query(
            r#"
            INSERT INTO characters (id, name, persona, mood, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(persona)
        .bind(mood)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Character {
            id,
            name: name.to_string(),
            persona: persona.to_string(),
            mood: mood.to_string(),
            created_at: now,
        })
    }

    pub async fn get_character(&self, character_id: &str) -> Result<Option<Character>> {
        let row = sqlx::query(
            "SELECT id, name, persona, mood, created_at FROM characters WHERE id = $1",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Character {
            id: row.get("id"),
            name: row.get("name"),
            persona: row.get("persona"),
            mood: row.get("mood"),
            created_at: from_unix(row.get("created_at")),
        }))
    }

    // ========================================================================
    // Weekly schedules
    // ========================================================================

    /// Store a character's schedule, replacing any previous one wholesale.
    pub async fn save_schedule(
        &self,
        character_id: &str,
        schedule: &WeeklySchedule,
    ) -> Result<()> {
        let json = serde_json::to_string(schedule)?;
        sqlx::query(
            r#"
            INSERT INTO character_schedules (character_id, schedule, generated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (character_id) DO UPDATE SET
                schedule = excluded.schedule,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(character_id)
        .bind(json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_schedule(&self, character_id: &str) -> Result<Option<WeeklySchedule>> {
        let row =
            sqlx::query("SELECT schedule FROM character_schedules WHERE character_id = $1")
                .bind(character_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.get("schedule");
        Ok(Some(serde_json::from_str(&json)?))
    }

    // ========================================================================
    // Matches
    // ========================================================================

    pub async fn create_match(&self, user_id: &str, character_id: &str) -> Result<Match> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO matches (id, user_id, character_id, status, created_at)
            VALUES ($1, $2, $3, 'active', $4)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(character_id)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Match {
            id,
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            status: MatchStatus::Active,
            ended_reason: None,
            created_at: now,
            ended_at: None,
        })
    }

    pub async fn get_match(&self, user_id: &str, character_id: &str) -> Result<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, character_id, status, ended_reason, created_at, ended_at
            FROM matches
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_match))
    }

    /// All users with at least one active match; the proactive tick fans out
    /// over this set.
    pub async fn active_user_ids(&self) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT DISTINCT user_id FROM matches WHERE status = 'active'")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("user_id"))
            .collect())
    }

    pub async fn active_matches_for_user(&self, user_id: &str) -> Result<Vec<Match>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, character_id, status, ended_reason, created_at, ended_at
            FROM matches
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_match).collect())
    }

    /// End a match. Guarded on the current status so a concurrent end is a
    /// no-op; returns whether this call flipped it.
    pub async fn end_match(
        &self,
        user_id: &str,
        character_id: &str,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE matches
            SET status = 'ended', ended_reason = $1, ended_at = $2
            WHERE user_id = $3 AND character_id = $4 AND status = 'active'
            "#,
        )
        .bind(reason)
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(character_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_match(row: sqlx::sqlite::SqliteRow) -> Match {
    let status: String = row.get("status");
    Match {
        id: row.get("id"),
        user_id: row.get("user_id"),
        character_id: row.get("character_id"),
        status: if status == "active" {
            MatchStatus::Active
        } else {
            MatchStatus::Ended
        },
        ended_reason: row.get("ended_reason"),
        created_at: from_unix(row.get("created_at")),
        ended_at: row
            .get::<Option<i64>, _>("ended_at")
            .map(from_unix),
    }
}
