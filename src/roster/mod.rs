// src/roster/mod.rs

//! Characters and user/character matches.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod store;

pub use store::RosterStore;

#[derive(Debug, Clone, Serialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub persona: String,
    pub mood: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Active,
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Ended => "ended",
        }
    }
}

/// A user/character pairing. Ended matches are kept for history; the
/// schedulers only ever touch active ones.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    pub status: MatchStatus,
    pub ended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }
}
