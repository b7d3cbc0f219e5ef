// src/chat/service.rs

//! User-facing message flows: posting, reading, history.
//!
//! The scheduler-side sends go through `EngagementStore`'s transactional
//! commits instead; this service covers the edges the API drives, plus the
//! engagement bookkeeping a user reply implies.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::warn;

use crate::compaction::CompactionEngine;
use crate::engagement::EngagementStore;
use crate::roster::RosterStore;
use crate::settings::SettingsStore;

use super::{ChatMessage, ChatRole, ConversationStore, ReadEvent};

pub struct MessageService {
    roster: Arc<RosterStore>,
    conversations: Arc<ConversationStore>,
    engagement: Arc<EngagementStore>,
    settings: Arc<SettingsStore>,
    compaction: Arc<CompactionEngine>,
}

impl MessageService {
    pub fn new(
        roster: Arc<RosterStore>,
        conversations: Arc<ConversationStore>,
        engagement: Arc<EngagementStore>,
        settings: Arc<SettingsStore>,
        compaction: Arc<CompactionEngine>,
    ) -> Self {
        Self {
            roster,
            conversations,
            engagement,
            settings,
            compaction,
        }
    }

    /// Persist a user message. Side effects: the give-up counter resets,
    /// the proactive cooldown clears, any armed follow-up is disarmed, and
    /// the conversation is checked for compaction.
    pub async fn post_user_message(
        &self,
        user_id: &str,
        character_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let Some(pair_match) = self.roster.get_match(user_id, character_id).await? else {
            bail!("no match between {} and {}", user_id, character_id);
        };
        if !pair_match.is_active() {
            bail!("match between {} and {} has ended", user_id, character_id);
        }

        let now = Utc::now();
        let conversation = self
            .conversations
            .ensure_conversation(user_id, character_id)
            .await?;
        let message = self
            .conversations
            .append_message(&conversation.id, ChatRole::User, content, now)
            .await?;

        self.engagement
            .note_user_reply(user_id, character_id, now)
            .await?;

        let settings = self.settings.load(user_id).await?;
        if let Err(e) = self
            .compaction
            .maybe_compact(&conversation.id, &settings)
            .await
        {
            warn!("Compaction after user message failed: {:#}", e);
        }

        Ok(message)
    }

    /// Mark the pair's unread character messages as read. Returns the read
    /// event when this left the character's latest message sitting
    /// unanswered — the caller arms the follow-up timer from it.
    pub async fn mark_read(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<ReadEvent>> {
        let Some(conversation) = self
            .conversations
            .get_conversation(user_id, character_id)
            .await?
        else {
            return Ok(None);
        };

        self.conversations
            .mark_character_messages_read(&conversation.id, Utc::now())
            .await
    }

    /// Newest-first history page plus the compaction summary covering
    /// everything older.
    pub async fn history(
        &self,
        user_id: &str,
        character_id: &str,
        limit: i64,
    ) -> Result<(Option<String>, Vec<ChatMessage>)> {
        let Some(conversation) = self
            .conversations
            .get_conversation(user_id, character_id)
            .await?
        else {
            return Ok((None, Vec::new()));
        };

        let messages = self
            .conversations
            .recent_messages(&conversation.id, limit)
            .await?;
        Ok((conversation.summary, messages))
    }
}
