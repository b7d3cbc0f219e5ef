// src/settings/store.rs

//! SQLite persistence for per-user behavior settings.
//! A missing row means the user runs on defaults.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::{BehaviorSettings, PacingStyle, SettingsError};

pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load a user's settings, falling back to defaults when unset.
    pub async fn load(&self, user_id: &str) -> Result<BehaviorSettings> {
        let row = sqlx::query(
            r#"
            SELECT max_emojis_per_message, pacing_style,
                   proactive_message_hours, daily_proactive_limit,
                   proactive_away_chance, proactive_busy_chance,
                   proactive_check_interval_minutes, max_consecutive_proactive,
                   proactive_cooldown_multiplier,
                   daily_left_on_read_limit, left_on_read_trigger_min_minutes,
                   left_on_read_trigger_max_minutes,
                   left_on_read_character_cooldown_minutes,
                   compact_threshold_percent, compact_target_percent,
                   keep_uncompacted_messages
            FROM behavior_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(BehaviorSettings::default());
        };

        let pacing: String = row.get("pacing_style");
        Ok(BehaviorSettings {
            max_emojis_per_message: row.get::<i64, _>("max_emojis_per_message") as u32,
            pacing_style: pacing.parse().unwrap_or(PacingStyle::Balanced),
            proactive_message_hours: row.get("proactive_message_hours"),
            daily_proactive_limit: row.get("daily_proactive_limit"),
            proactive_away_chance: row.get("proactive_away_chance"),
            proactive_busy_chance: row.get("proactive_busy_chance"),
            proactive_check_interval_minutes: row.get("proactive_check_interval_minutes"),
            max_consecutive_proactive: row.get("max_consecutive_proactive"),
            proactive_cooldown_multiplier: row.get("proactive_cooldown_multiplier"),
            daily_left_on_read_limit: row.get("daily_left_on_read_limit"),
            left_on_read_trigger_min_minutes: row.get("left_on_read_trigger_min_minutes"),
            left_on_read_trigger_max_minutes: row.get("left_on_read_trigger_max_minutes"),
            left_on_read_character_cooldown_minutes: row
                .get("left_on_read_character_cooldown_minutes"),
            compact_threshold_percent: row.get("compact_threshold_percent"),
            compact_target_percent: row.get("compact_target_percent"),
            keep_uncompacted_messages: row.get("keep_uncompacted_messages"),
        })
    }

    /// Validate and upsert a user's settings. Invalid settings never reach
    /// the table, so the schedulers can trust what they read.
    pub async fn save(
        &self,
        user_id: &str,
        settings: &BehaviorSettings,
    ) -> Result<(), SaveError> {
        settings.validate().map_err(SaveError::Invalid)?;

        sqlx::query(
            r#"
            INSERT INTO behavior_settings (
                user_id, max_emojis_per_message, pacing_style,
                proactive_message_hours, daily_proactive_limit,
                proactive_away_chance, proactive_busy_chance,
                proactive_check_interval_minutes, max_consecutive_proactive,
                proactive_cooldown_multiplier,
                daily_left_on_read_limit, left_on_read_trigger_min_minutes,
                left_on_read_trigger_max_minutes,
                left_on_read_character_cooldown_minutes,
                compact_threshold_percent, compact_target_percent,
                keep_uncompacted_messages, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (user_id) DO UPDATE SET
                max_emojis_per_message = excluded.max_emojis_per_message,
                pacing_style = excluded.pacing_style,
                proactive_message_hours = excluded.proactive_message_hours,
                daily_proactive_limit = excluded.daily_proactive_limit,
                proactive_away_chance = excluded.proactive_away_chance,
                proactive_busy_chance = excluded.proactive_busy_chance,
                proactive_check_interval_minutes = excluded.proactive_check_interval_minutes,
                max_consecutive_proactive = excluded.max_consecutive_proactive,
                proactive_cooldown_multiplier = excluded.proactive_cooldown_multiplier,
                daily_left_on_read_limit = excluded.daily_left_on_read_limit,
                left_on_read_trigger_min_minutes = excluded.left_on_read_trigger_min_minutes,
                left_on_read_trigger_max_minutes = excluded.left_on_read_trigger_max_minutes,
                left_on_read_character_cooldown_minutes = excluded.left_on_read_character_cooldown_minutes,
                compact_threshold_percent = excluded.compact_threshold_percent,
                compact_target_percent = excluded.compact_target_percent,
                keep_uncompacted_messages = excluded.keep_uncompacted_messages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(settings.max_emojis_per_message as i64)
        .bind(settings.pacing_style.as_str())
        .bind(settings.proactive_message_hours)
        .bind(settings.daily_proactive_limit)
        .bind(settings.proactive_away_chance)
        .bind(settings.proactive_busy_chance)
        .bind(settings.proactive_check_interval_minutes)
        .bind(settings.max_consecutive_proactive)
        .bind(settings.proactive_cooldown_multiplier)
        .bind(settings.daily_left_on_read_limit)
        .bind(settings.left_on_read_trigger_min_minutes)
        .bind(settings.left_on_read_trigger_max_minutes)
        .bind(settings.left_on_read_character_cooldown_minutes)
        .bind(settings.compact_threshold_percent)
        .bind(settings.compact_target_percent)
        .bind(settings.keep_uncompacted_messages)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| SaveError::Storage(e.into()))?;

        Ok(())
    }
}

/// Save failures split into "your settings are wrong" and "the database is".
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Invalid(#[from] SettingsError),
    #[error(transparent)]
    Storage(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("create in-memory database");
        db::migration::run_migrations(&pool)
            .await
            .expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn test_missing_row_yields_defaults() {
        let store = SettingsStore::new(test_pool().await);
        let settings = store.load("nobody").await.unwrap();
        assert_eq!(settings, BehaviorSettings::default());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = SettingsStore::new(test_pool().await);

        let mut settings = BehaviorSettings::default();
        settings.daily_proactive_limit = 3;
        settings.pacing_style = PacingStyle::Eager;
        settings.proactive_away_chance = 25.0;

        store.save("ada", &settings).await.unwrap();
        let loaded = store.load("ada").await.unwrap();
        assert_eq!(loaded, settings);

        // Second save overwrites
        settings.daily_proactive_limit = 7;
        store.save("ada", &settings).await.unwrap();
        assert_eq!(store.load("ada").await.unwrap().daily_proactive_limit, 7);
    }

    #[tokio::test]
    async fn test_invalid_settings_never_reach_storage() {
        let store = SettingsStore::new(test_pool().await);

        let settings = BehaviorSettings {
            left_on_read_trigger_min_minutes: 30,
            left_on_read_trigger_max_minutes: 10,
            ..Default::default()
        };
        assert!(matches!(
            store.save("ada", &settings).await,
            Err(SaveError::Invalid(_))
        ));
        assert_eq!(
            store.load("ada").await.unwrap(),
            BehaviorSettings::default()
        );
    }
}
