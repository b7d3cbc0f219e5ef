// src/engagement/store.rs

//! SQLite persistence for engagement state, the follow-up queue, and the
//! transactional send commits.
//!
//! A send is one transaction: the message row, the budget slot, the state
//! update, and (for a final proactive) the auto-unmatch all land together or
//! not at all. The match row is re-checked inside the transaction so a pair
//! unmatched mid-flight discards the generated message instead of
//! persisting it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::from_unix;
use crate::settings::BehaviorSettings;

use super::budget::{BudgetKind, BudgetLedger};
use super::eligibility::proactive_cooldown_after;
use super::EngagementState;

/// Result of a transactional send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { message_id: i64, unmatched: bool },
    /// The guarded counter refused the slot; nothing was persisted.
    BudgetExhausted,
    /// The match (or its state row) disappeared mid-flight; the generated
    /// message is discarded.
    PairGone,
}

/// A due entry from the follow-up queue.
#[derive(Debug, Clone)]
pub struct FollowUpTicket {
    pub user_id: String,
    pub character_id: String,
    pub message_id: i64,
    pub read_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

pub struct EngagementStore {
    pool: SqlitePool,
}

impl EngagementStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Engagement state
    // ========================================================================

    /// Load a pair's state, creating it lazily on first touch with
    /// `last_message_at = now`.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        character_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EngagementState> {
        sqlx::query(
            r#"
            INSERT INTO engagement_state (user_id, character_id, last_message_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id, character_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, character_id, last_message_at, last_proactive_at,
                   consecutive_unanswered_proactive, proactive_cooldown_until,
                   last_left_on_read_at, left_on_read_cooldown_until
            FROM engagement_state
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_state(row))
    }

    pub async fn get(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<EngagementState>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, character_id, last_message_at, last_proactive_at,
                   consecutive_unanswered_proactive, proactive_cooldown_until,
                   last_left_on_read_at, left_on_read_cooldown_until
            FROM engagement_state
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_state))
    }

    /// A user reply resets the give-up counter, clears the proactive
    /// cooldown early, and disarms any pending follow-up.
    pub async fn note_user_reply(
        &self,
        user_id: &str,
        character_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.get_or_create(user_id, character_id, now).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE engagement_state
            SET last_message_at = $1,
                consecutive_unanswered_proactive = 0,
                proactive_cooldown_until = NULL,
                updated_at = $1
            WHERE user_id = $2 AND character_id = $3
            "#,
        )
        .bind(now.timestamp())
        .bind(user_id)
        .bind(character_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM follow_up_queue WHERE user_id = $1 AND character_id = $2")
            .bind(user_id)
            .bind(character_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Remove a pair's scheduler state entirely (unmatch cleanup).
    pub async fn delete_pair(&self, user_id: &str, character_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_pair_on(&mut tx, user_id, character_id).await?;
        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Follow-up queue
    // ========================================================================

    /// Arm (or re-arm) the pair's single follow-up timer. Replacing the row
    /// is the cancel-and-replace semantic: at most one timer per pair.
    pub async fn arm_follow_up(
        &self,
        user_id: &str,
        character_id: &str,
        message_id: i64,
        read_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO follow_up_queue
                (user_id, character_id, message_id, read_at, due_at, armed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(message_id)
        .bind(read_at.timestamp())
        .bind(due_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cancel_follow_up(&self, user_id: &str, character_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM follow_up_queue WHERE user_id = $1 AND character_id = $2")
            .bind(user_id)
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Queue entries whose fire time has arrived.
    pub async fn due_follow_ups(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FollowUpTicket>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, character_id, message_id, read_at, due_at
            FROM follow_up_queue
            WHERE due_at <= $1
            ORDER BY due_at
            LIMIT $2
            "#,
        )
        .bind(now.timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FollowUpTicket {
                user_id: row.get("user_id"),
                character_id: row.get("character_id"),
                message_id: row.get("message_id"),
                read_at: from_unix(row.get("read_at")),
                due_at: from_unix(row.get("due_at")),
            })
            .collect())
    }

    // ========================================================================
    // Transactional send commits
    // ========================================================================

    /// Commit a proactive send: message + budget slot + escalated cooldown,
    /// and the terminal auto-unmatch when the unanswered counter hits the
    /// configured maximum.
    pub async fn commit_proactive_send(
        &self,
        user_id: &str,
        character_id: &str,
        conversation_id: &str,
        content: &str,
        day: &str,
        now: DateTime<Utc>,
        settings: &BehaviorSettings,
    ) -> Result<SendOutcome> {
        let mut tx = self.pool.begin().await?;

        if !pair_is_active(&mut tx, user_id, character_id).await? {
            tx.rollback().await?;
            return Ok(SendOutcome::PairGone);
        }

        // Fresh read under the transaction; the pre-tick snapshot may be
        // stale by the time we get here.
        let consecutive: Option<i64> = sqlx::query(
            r#"
            SELECT consecutive_unanswered_proactive
            FROM engagement_state
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.get("consecutive_unanswered_proactive"));

        let Some(consecutive) = consecutive else {
            tx.rollback().await?;
            return Ok(SendOutcome::PairGone);
        };

        let message_id: i64 = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES ($1, 'character', $2, $3)
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(content)
        .bind(now.timestamp())
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let consumed = BudgetLedger::try_consume(
            &mut tx,
            user_id,
            day,
            BudgetKind::Proactive,
            settings.daily_proactive_limit,
        )
        .await?;
        if !consumed {
            tx.rollback().await?;
            return Ok(SendOutcome::BudgetExhausted);
        }

        let consecutive_after = consecutive + 1;
        let cooldown_until = proactive_cooldown_after(settings, consecutive_after, now);

        sqlx::query(
            r#"
            UPDATE engagement_state
            SET last_message_at = $1,
                last_proactive_at = $1,
                consecutive_unanswered_proactive = $2,
                proactive_cooldown_until = $3,
                updated_at = $1
            WHERE user_id = $4 AND character_id = $5
            "#,
        )
        .bind(now.timestamp())
        .bind(consecutive_after)
        .bind(cooldown_until.timestamp())
        .bind(user_id)
        .bind(character_id)
        .execute(&mut *tx)
        .await?;

        let unmatched = consecutive_after >= settings.max_consecutive_proactive;
        if unmatched {
            sqlx::query(
                r#"
                UPDATE matches
                SET status = 'ended', ended_reason = 'gave_up', ended_at = $1
                WHERE user_id = $2 AND character_id = $3 AND status = 'active'
                "#,
            )
            .bind(now.timestamp())
            .bind(user_id)
            .bind(character_id)
            .execute(&mut *tx)
            .await?;
            delete_pair_on(&mut tx, user_id, character_id).await?;
        }

        tx.commit().await?;
        Ok(SendOutcome::Sent {
            message_id,
            unmatched,
        })
    }

    /// Commit a left-on-read follow-up: message + budget slot + flat
    /// per-character cooldown; the consumed queue row goes with it.
    pub async fn commit_follow_up_send(
        &self,
        user_id: &str,
        character_id: &str,
        conversation_id: &str,
        content: &str,
        day: &str,
        now: DateTime<Utc>,
        settings: &BehaviorSettings,
    ) -> Result<SendOutcome> {
        let mut tx = self.pool.begin().await?;

        if !pair_is_active(&mut tx, user_id, character_id).await? {
            tx.rollback().await?;
            return Ok(SendOutcome::PairGone);
        }

        let message_id: i64 = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES ($1, 'character', $2, $3)
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(content)
        .bind(now.timestamp())
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let consumed = BudgetLedger::try_consume(
            &mut tx,
            user_id,
            day,
            BudgetKind::LeftOnRead,
            settings.daily_left_on_read_limit,
        )
        .await?;
        if !consumed {
            tx.rollback().await?;
            return Ok(SendOutcome::BudgetExhausted);
        }

        let cooldown_until =
            now + chrono::Duration::minutes(settings.left_on_read_character_cooldown_minutes);

        sqlx::query(
            r#"
            UPDATE engagement_state
            SET last_message_at = $1,
                last_left_on_read_at = $1,
                left_on_read_cooldown_until = $2,
                updated_at = $1
            WHERE user_id = $3 AND character_id = $4
            "#,
        )
        .bind(now.timestamp())
        .bind(cooldown_until.timestamp())
        .bind(user_id)
        .bind(character_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM follow_up_queue WHERE user_id = $1 AND character_id = $2")
            .bind(user_id)
            .bind(character_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SendOutcome::Sent {
            message_id,
            unmatched: false,
        })
    }
}

async fn pair_is_active(
    conn: &mut SqliteConnection,
    user_id: &str,
    character_id: &str,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT status FROM matches WHERE user_id = $1 AND character_id = $2",
    )
    .bind(user_id)
    .bind(character_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row
        .map(|r| r.get::<String, _>("status") == "active")
        .unwrap_or(false))
}

async fn delete_pair_on(
    conn: &mut SqliteConnection,
    user_id: &str,
    character_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM engagement_state WHERE user_id = $1 AND character_id = $2")
        .bind(user_id)
        .bind(character_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM follow_up_queue WHERE user_id = $1 AND character_id = $2")
        .bind(user_id)
        .bind(character_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn row_to_state(row: sqlx::sqlite::SqliteRow) -> EngagementState {
    EngagementState {
        user_id: row.get("user_id"),
        character_id: row.get("character_id"),
        last_message_at: from_unix(row.get("last_message_at")),
        last_proactive_at: row
            .get::<Option<i64>, _>("last_proactive_at")
            .map(from_unix),
        consecutive_unanswered_proactive: row.get("consecutive_unanswered_proactive"),
        proactive_cooldown_until: row
            .get::<Option<i64>, _>("proactive_cooldown_until")
            .map(from_unix),
        last_left_on_read_at: row
            .get::<Option<i64>, _>("last_left_on_read_at")
            .map(from_unix),
        left_on_read_cooldown_until: row
            .get::<Option<i64>, _>("left_on_read_cooldown_until")
            .map(from_unix),
    }
}
