// src/db/migration.rs
//! Handles migrations for SQLite: ensures all tables match the latest schema.
//! Run this at startup to guarantee schema compatibility.

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

const CREATE_CHARACTERS: &str = r#"
CREATE TABLE IF NOT EXISTS characters (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    persona TEXT NOT NULL,
    mood TEXT NOT NULL DEFAULT 'neutral',
    created_at INTEGER NOT NULL
);
"#;

/// One row per character; replaced wholesale on regeneration.
const CREATE_CHARACTER_SCHEDULES: &str = r#"
CREATE TABLE IF NOT EXISTS character_schedules (
    character_id TEXT PRIMARY KEY,
    schedule TEXT NOT NULL,
    generated_at INTEGER NOT NULL,
    FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE
);
"#;

const CREATE_MATCHES: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'ended')),
    ended_reason TEXT,
    created_at INTEGER NOT NULL,
    ended_at INTEGER,
    UNIQUE (user_id, character_id)
);
"#;

const CREATE_CONVERSATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    summary TEXT,
    summary_boundary INTEGER,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, character_id)
);
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'character')),
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    read_at INTEGER,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
"#;

const CREATE_MESSAGES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_conversation
ON messages (conversation_id, created_at);
"#;

/// One row per matched pair; deleted when the pair is unmatched.
const CREATE_ENGAGEMENT_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS engagement_state (
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    last_message_at INTEGER NOT NULL,
    last_proactive_at INTEGER,
    consecutive_unanswered_proactive INTEGER NOT NULL DEFAULT 0,
    proactive_cooldown_until INTEGER,
    last_left_on_read_at INTEGER,
    left_on_read_cooldown_until INTEGER,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, character_id)
);
"#;

/// Shared per-user daily budgets, keyed by local calendar day.
/// Incremented only through the guarded UPDATE in engagement::budget.
const CREATE_DAILY_COUNTERS: &str = r#"
CREATE TABLE IF NOT EXISTS daily_counters (
    user_id TEXT NOT NULL,
    day TEXT NOT NULL,
    proactive_sent INTEGER NOT NULL DEFAULT 0,
    left_on_read_sent INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, day)
);
"#;

/// Durable delayed-task queue for left-on-read follow-ups.
/// At most one armed row per pair; re-arming replaces the previous row.
const CREATE_FOLLOW_UP_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS follow_up_queue (
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    message_id INTEGER NOT NULL,
    read_at INTEGER NOT NULL,
    due_at INTEGER NOT NULL,
    armed_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, character_id)
);
"#;

const CREATE_FOLLOW_UP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_follow_up_due ON follow_up_queue (due_at);
"#;

const CREATE_BEHAVIOR_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS behavior_settings (
    user_id TEXT PRIMARY KEY,
    max_emojis_per_message INTEGER NOT NULL,
    proactive_message_hours INTEGER NOT NULL,
    daily_proactive_limit INTEGER NOT NULL,
    proactive_away_chance REAL NOT NULL,
    proactive_busy_chance REAL NOT NULL,
    proactive_check_interval_minutes INTEGER NOT NULL,
    max_consecutive_proactive INTEGER NOT NULL,
    proactive_cooldown_multiplier REAL NOT NULL,
    daily_left_on_read_limit INTEGER NOT NULL,
    left_on_read_trigger_min_minutes INTEGER NOT NULL,
    left_on_read_trigger_max_minutes INTEGER NOT NULL,
    left_on_read_character_cooldown_minutes INTEGER NOT NULL,
    pacing_style TEXT NOT NULL,
    compact_threshold_percent REAL NOT NULL,
    compact_target_percent REAL NOT NULL,
    keep_uncompacted_messages INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Run all migrations. Statements are idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let statements = [
        CREATE_CHARACTERS,
        CREATE_CHARACTER_SCHEDULES,
        CREATE_MATCHES,
        CREATE_CONVERSATIONS,
        CREATE_MESSAGES,
        CREATE_MESSAGES_INDEX,
        CREATE_ENGAGEMENT_STATE,
        CREATE_DAILY_COUNTERS,
        CREATE_FOLLOW_UP_QUEUE,
        CREATE_FOLLOW_UP_INDEX,
        CREATE_BEHAVIOR_SETTINGS,
    ];

    for sql in statements {
        pool.execute(sql).await?;
    }

    Ok(())
}
