// src/chat/mod.rs

//! Conversations and messages between a user and a character.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod service;
pub mod store;

pub use service::MessageService;
pub use store::ConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Character,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Character => "character",
        }
    }

    pub fn parse(s: &str) -> ChatRole {
        if s == "user" {
            ChatRole::User
        } else {
            ChatRole::Character
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set on character messages once the user has read them.
    pub read_at: Option<DateTime<Utc>>,
}

/// One conversation per matched pair, carrying the compaction summary and
/// the boundary message id it covers.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    pub summary: Option<String>,
    pub summary_boundary: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A "character message was read and sits unanswered" transition, as
/// observed by the read endpoint. Drives left-on-read arming.
#[derive(Debug, Clone, Copy)]
pub struct ReadEvent {
    pub message_id: i64,
    pub read_at: DateTime<Utc>,
}
