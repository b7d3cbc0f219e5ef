// tests/common/mod.rs
// Shared fixtures: in-memory database, scripted collaborators, fixed clocks.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use kindred::chat::ChatMessage;
use kindred::db;
use kindred::engagement::eligibility::ChanceSource;
use kindred::engagement::TickInstant;
use kindred::llm::{ContentEngine, GenerationHints};
use kindred::roster::Character;
use kindred::schedule::{
    generator, PresenceStatus, ScheduleBlock, StatusResolution, WeeklySchedule, DAY_KEYS,
};
use kindred::state::AppState;

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("create in-memory database");
    db::migration::run_migrations(&pool)
        .await
        .expect("run migrations");
    pool
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Content engine with canned responses and a failure switch.
#[derive(Default)]
pub struct ScriptedEngine {
    pub fail_generation: AtomicBool,
    pub proactive_calls: AtomicUsize,
    pub follow_up_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn set_failing(&self, failing: bool) {
        self.fail_generation.store(failing, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_generation.load(Ordering::SeqCst) {
            anyhow::bail!("scripted collaborator failure");
        }
        Ok(())
    }
}

#[async_trait]
impl ContentEngine for ScriptedEngine {
    async fn generate_proactive_message(
        &self,
        character: &Character,
        presence: &StatusResolution,
        _hints: &GenerationHints,
    ) -> Result<String> {
        self.check_failure()?;
        let n = self.proactive_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "hey, it's {} ({} #{})",
            character.name,
            presence.status.as_str(),
            n + 1
        ))
    }

    async fn generate_left_on_read_message(
        &self,
        _character: &Character,
        last_read_message: &str,
        _hints: &GenerationHints,
    ) -> Result<String> {
        self.check_failure()?;
        self.follow_up_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("so... about \"{}\"", last_read_message))
    }

    async fn summarize_messages(
        &self,
        prior_summary: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String> {
        self.check_failure()?;
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "summary[{}{}]",
            messages.len(),
            if prior_summary.is_some() { "+prior" } else { "" }
        ))
    }

    async fn generate_weekly_schedule(&self, _character: &Character) -> Result<WeeklySchedule> {
        self.check_failure()?;
        Ok(generator::default_weekly_schedule())
    }
}

/// Chance source pinned to fixed values.
pub struct FixedChance {
    pub roll: f64,
    pub delay: i64,
}

impl FixedChance {
    pub fn always_pass() -> Self {
        Self {
            roll: 0.0,
            delay: 7,
        }
    }
}

impl ChanceSource for FixedChance {
    fn roll_percent(&self) -> f64 {
        self.roll
    }

    fn delay_minutes(&self, _min: i64, _max: i64) -> i64 {
        self.delay
    }
}

// ============================================================================
// Assembly and seeding
// ============================================================================

pub struct TestWorld {
    pub state: Arc<AppState>,
    pub engine: Arc<ScriptedEngine>,
}

pub async fn build_world(chance: FixedChance) -> TestWorld {
    let pool = test_pool().await;
    let engine = Arc::new(ScriptedEngine::default());
    let state = AppState::assemble(pool, engine.clone(), Arc::new(chance), 4);
    TestWorld { state, engine }
}

/// A schedule with one block per day at the given status, covering almost
/// the whole day.
pub fn uniform_schedule(status: PresenceStatus) -> WeeklySchedule {
    let mut schedule = WeeklySchedule::default();
    for day in DAY_KEYS {
        schedule.days.insert(
            day.to_string(),
            vec![ScheduleBlock {
                start: "00:00".to_string(),
                end: "23:59".to_string(),
                status,
                activity: None,
            }],
        );
    }
    schedule
}

/// Create a character with the given schedule, matched with `user_id`, with
/// engagement state seeded at `last_message_at`.
pub async fn seed_pair(
    world: &TestWorld,
    user_id: &str,
    name: &str,
    status: PresenceStatus,
    last_message_at: DateTime<Utc>,
) -> String {
    let character = world
        .state
        .roster
        .create_character(name, "test persona", None)
        .await
        .expect("create character");
    world
        .state
        .roster
        .save_schedule(&character.id, &uniform_schedule(status))
        .await
        .expect("save schedule");
    world
        .state
        .roster
        .create_match(user_id, &character.id)
        .await
        .expect("create match");
    world
        .state
        .conversations
        .ensure_conversation(user_id, &character.id)
        .await
        .expect("create conversation");
    world
        .state
        .engagement
        .get_or_create(user_id, &character.id, last_message_at)
        .await
        .expect("seed engagement state");
    character.id
}

// ============================================================================
// Fixed clocks
// ============================================================================

/// Monday 2025-01-06, 12:00 naive local time.
pub fn monday_noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 6)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// A tick whose UTC and local clocks agree on the given naive instant, so
/// schedule resolution and day keys line up in tests.
pub fn tick_at(naive: NaiveDateTime) -> TickInstant {
    TickInstant {
        utc: DateTime::from_naive_utc_and_offset(naive, Utc),
        local: naive,
    }
}

pub fn utc_of(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}
