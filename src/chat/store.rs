// src/chat/store.rs

//! SQLite persistence for conversations and messages.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::from_unix;

use super::{ChatMessage, ChatRole, Conversation, ReadEvent};

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Conversations
    // ========================================================================

    /// Get the pair's conversation, creating it on first touch.
    pub async fn ensure_conversation(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Conversation> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, character_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, character_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(character_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.get_conversation(user_id, character_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation vanished after insert"))
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, character_id, summary, summary_boundary, created_at
            FROM conversations
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_conversation))
    }

    pub async fn get_conversation_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, character_id, summary, summary_boundary, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_conversation))
    }

    /// Replace the conversation's compaction summary and boundary pointer.
    /// Only the compaction engine writes these.
    pub async fn set_summary(
        &self,
        conversation_id: &str,
        summary: &str,
        boundary_message_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET summary = $1, summary_boundary = $2 WHERE id = $3",
        )
        .bind(summary)
        .bind(boundary_message_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: ChatRole,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatMessage {
            id: row.get("id"),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
            read_at: None,
        })
    }

    /// Newest-first page of messages.
    pub async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, read_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Messages not yet folded into the summary, oldest first. This is the
    /// compaction engine's working set and the verbatim context tail.
    pub async fn messages_after_boundary(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, read_at
            FROM messages
            WHERE conversation_id = $1 AND id > $2
            ORDER BY created_at, id
            "#,
        )
        .bind(&conversation.id)
        .bind(conversation.summary_boundary.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    pub async fn get_message(&self, message_id: i64) -> Result<Option<ChatMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, read_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_message))
    }

    /// Mark all unread character messages as read. Returns a `ReadEvent`
    /// only when this newly read the conversation's latest message and that
    /// message is the character's — i.e. the user has seen it and not
    /// replied.
    pub async fn mark_character_messages_read(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ReadEvent>> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read_at = $1
            WHERE conversation_id = $2 AND role = 'character' AND read_at IS NULL
            "#,
        )
        .bind(now.timestamp())
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let latest = sqlx::query(
            r#"
            SELECT id, role
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(latest.and_then(|row| {
            let role: String = row.get("role");
            (role == "character").then(|| ReadEvent {
                message_id: row.get("id"),
                read_at: now,
            })
        }))
    }

    /// Has the user sent anything after `since`? Used to cancel left-on-read
    /// follow-ups at fire time.
    pub async fn user_replied_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM messages
                WHERE conversation_id = $1 AND role = 'user' AND created_at > $2
            ) AS replied
            "#,
        )
        .bind(conversation_id)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("replied") != 0)
    }
}

fn row_to_conversation(row: sqlx::sqlite::SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        character_id: row.get("character_id"),
        summary: row.get("summary"),
        summary_boundary: row.get("summary_boundary"),
        created_at: from_unix(row.get("created_at")),
    }
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> ChatMessage {
    let role: String = row.get("role");
    ChatMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: ChatRole::parse(&role),
        content: row.get("content"),
        created_at: from_unix(row.get("created_at")),
        read_at: row.get::<Option<i64>, _>("read_at").map(from_unix),
    }
}
