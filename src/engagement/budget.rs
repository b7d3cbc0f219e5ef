// src/engagement/budget.rs

//! Daily budget ledger.
//!
//! Per-user counters keyed by local calendar day, shared by every character
//! the user has matched. The increment is a guarded compare-and-increment
//! executed on the caller's transaction, so a send can never overshoot the
//! cap even under concurrent fires, and a rolled-back send never spends a
//! slot.

use anyhow::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    Proactive,
    LeftOnRead,
}

impl BudgetKind {
    fn column(&self) -> &'static str {
        match self {
            BudgetKind::Proactive => "proactive_sent",
            BudgetKind::LeftOnRead => "left_on_read_sent",
        }
    }
}

pub struct BudgetLedger {
    pool: SqlitePool,
}

impl BudgetLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// How many sends of this kind the user has spent today.
    pub async fn sent_today(&self, user_id: &str, day: &str, kind: BudgetKind) -> Result<i64> {
        let sql = format!(
            "SELECT {} AS sent FROM daily_counters WHERE user_id = $1 AND day = $2",
            kind.column()
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("sent")).unwrap_or(0))
    }

    /// Atomically claim one budget slot on an open transaction. Returns
    /// false (claiming nothing) when the counter is already at the cap; the
    /// caller is expected to roll back.
    pub async fn try_consume(
        conn: &mut SqliteConnection,
        user_id: &str,
        day: &str,
        kind: BudgetKind,
        cap: i64,
    ) -> Result<bool> {
        sqlx::query(
            r#"
            INSERT INTO daily_counters (user_id, day)
            VALUES ($1, $2)
            ON CONFLICT (user_id, day) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(day)
        .execute(&mut *conn)
        .await?;

        let sql = format!(
            "UPDATE daily_counters SET {col} = {col} + 1 \
             WHERE user_id = $1 AND day = $2 AND {col} < $3",
            col = kind.column()
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(day)
            .bind(cap)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop counter rows older than the retention horizon. Days are
    /// lexicographically ordered, so a plain comparison works.
    pub async fn purge_older_than(&self, cutoff_day: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_counters WHERE day < $1")
            .bind(cutoff_day)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
