// src/engagement/mod.rs

//! Character engagement: proactive messaging, left-on-read follow-ups, and
//! the shared eligibility/budget machinery behind both.
//!
//! Per-pair state transitions are serialized through `PairLocks`, daily
//! budgets through guarded counter updates, and every send commits its
//! message, budget slot, and state change in one transaction.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;

pub mod budget;
pub mod eligibility;
pub mod left_on_read;
pub mod locks;
pub mod proactive;
pub mod store;

pub use budget::BudgetLedger;
pub use left_on_read::FollowUpScheduler;
pub use locks::PairLocks;
pub use proactive::ProactiveScheduler;
pub use store::EngagementStore;

/// Scheduler view of one user/character pair.
#[derive(Debug, Clone)]
pub struct EngagementState {
    pub user_id: String,
    pub character_id: String,
    /// Last message in either direction.
    pub last_message_at: DateTime<Utc>,
    pub last_proactive_at: Option<DateTime<Utc>>,
    pub consecutive_unanswered_proactive: i64,
    pub proactive_cooldown_until: Option<DateTime<Utc>>,
    pub last_left_on_read_at: Option<DateTime<Utc>>,
    pub left_on_read_cooldown_until: Option<DateTime<Utc>>,
}

/// A scheduler tick's notion of "now": the UTC instant for state math and
/// the local wall clock for schedule resolution and day keys. Tests build
/// these directly to drive ticks at fixed times.
#[derive(Debug, Clone, Copy)]
pub struct TickInstant {
    pub utc: DateTime<Utc>,
    pub local: NaiveDateTime,
}

impl TickInstant {
    pub fn now() -> Self {
        let local = Local::now();
        Self {
            utc: Utc::now(),
            local: local.naive_local(),
        }
    }

    /// Calendar-day key for the daily budget ledger.
    pub fn day_key(&self) -> String {
        self.local.format("%Y-%m-%d").to_string()
    }
}

pub fn pair_key(user_id: &str, character_id: &str) -> String {
    format!("{}:{}", user_id, character_id)
}

/// The conceptual engagement phase of a pair, derived from state for the
/// status endpoint and logs; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementPhase {
    Idle,
    CoolingDown,
    GaveUp,
}

pub fn derive_phase(
    state: &EngagementState,
    max_consecutive: i64,
    now: DateTime<Utc>,
) -> EngagementPhase {
    if state.consecutive_unanswered_proactive >= max_consecutive {
        return EngagementPhase::GaveUp;
    }
    match state.proactive_cooldown_until {
        Some(until) if now < until => EngagementPhase::CoolingDown,
        _ => EngagementPhase::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> EngagementState {
        let now = Utc::now();
        EngagementState {
            user_id: "u".to_string(),
            character_id: "c".to_string(),
            last_message_at: now,
            last_proactive_at: None,
            consecutive_unanswered_proactive: 0,
            proactive_cooldown_until: None,
            last_left_on_read_at: None,
            left_on_read_cooldown_until: None,
        }
    }

    #[test]
    fn test_derive_phase() {
        let now = Utc::now();
        let mut s = state();
        assert_eq!(derive_phase(&s, 4, now), EngagementPhase::Idle);

        s.proactive_cooldown_until = Some(now + Duration::minutes(10));
        assert_eq!(derive_phase(&s, 4, now), EngagementPhase::CoolingDown);

        s.consecutive_unanswered_proactive = 4;
        assert_eq!(derive_phase(&s, 4, now), EngagementPhase::GaveUp);
    }

    #[test]
    fn test_day_key_uses_the_local_clock() {
        let tick = TickInstant {
            utc: Utc::now(),
            local: chrono::NaiveDate::from_ymd_opt(2025, 3, 9)
                .unwrap()
                .and_hms_opt(0, 30, 0)
                .unwrap(),
        };
        assert_eq!(tick.day_key(), "2025-03-09");
    }
}
