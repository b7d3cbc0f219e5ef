// src/server/types.rs

//! Request/response payloads for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::schedule::PresenceStatus;

#[derive(Debug, Deserialize)]
pub struct CreateCharacterRequest {
    pub name: String,
    pub persona: String,
    #[serde(default)]
    pub mood: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCharacterResponse {
    pub id: String,
    pub name: String,
    pub mood: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub user_id: String,
    pub character_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMatchResponse {
    pub match_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PresenceStatus,
    pub activity: Option<String>,
    pub mood: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub follow_up_armed: bool,
    pub due_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub summary: Option<String>,
    pub messages: Vec<ChatMessage>,
}
