// src/compaction/mod.rs

//! Conversation compaction.
//!
//! Consulted after every persisted turn. When the estimated token usage of
//! a conversation crosses the configured threshold, the oldest
//! not-yet-summarized messages are folded — batch by batch, prior summary
//! included — into a replacement summary until usage drops to the target.
//! The `keep_uncompacted_messages` floor is hard: the newest N messages are
//! never summarized, even if that leaves usage above the target.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::chat::{ChatMessage, ConversationStore};
use crate::config::CONFIG;
use crate::llm::ContentEngine;
use crate::settings::BehaviorSettings;

/// Rough token estimate: one token per four characters. Any monotonic proxy
/// satisfies the contract; this one matches what the context budget is
/// denominated in closely enough.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn usage_of(summary: Option<&str>, messages: &[ChatMessage]) -> usize {
    let summary_tokens = summary.map(estimate_tokens).unwrap_or(0);
    let message_tokens: usize = messages
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum();
    summary_tokens + message_tokens
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionReport {
    pub passes: usize,
    pub messages_compacted: usize,
    pub usage_before: usize,
    pub usage_after: usize,
}

pub struct CompactionEngine {
    conversations: Arc<ConversationStore>,
    engine: Arc<dyn ContentEngine>,
}

impl CompactionEngine {
    pub fn new(conversations: Arc<ConversationStore>, engine: Arc<dyn ContentEngine>) -> Self {
        Self {
            conversations,
            engine,
        }
    }

    /// Check a conversation's usage and compact if needed. Collaborator
    /// failure stops the pass early; the next turn retries naturally.
    pub async fn maybe_compact(
        &self,
        conversation_id: &str,
        settings: &BehaviorSettings,
    ) -> Result<CompactionReport> {
        let Some(mut conversation) = self
            .conversations
            .get_conversation_by_id(conversation_id)
            .await?
        else {
            return Ok(CompactionReport::default());
        };

        let mut messages = self.conversations.messages_after_boundary(&conversation).await?;

        let window = CONFIG.context_window_tokens as f64;
        let threshold = (settings.compact_threshold_percent / 100.0 * window) as usize;
        let target = (settings.compact_target_percent / 100.0 * window) as usize;
        let keep = settings.keep_uncompacted_messages as usize;

        let usage_before = usage_of(conversation.summary.as_deref(), &messages);
        if usage_before < threshold {
            return Ok(CompactionReport {
                usage_before,
                usage_after: usage_before,
                ..Default::default()
            });
        }

        let mut report = CompactionReport {
            usage_before,
            usage_after: usage_before,
            ..Default::default()
        };

        loop {
            // The newest `keep` messages are out of bounds, always.
            let eligible = messages.len().saturating_sub(keep);
            if eligible == 0 {
                debug!(
                    "Compaction floor reached for {} at ~{} tokens",
                    conversation_id, report.usage_after
                );
                break;
            }

            let batch_len = eligible.min(CONFIG.compact_batch_size);
            let batch: Vec<ChatMessage> = messages[..batch_len].to_vec();

            let summary = match tokio::time::timeout(
                CONFIG.llm_timeout(),
                self.engine
                    .summarize_messages(conversation.summary.as_deref(), &batch),
            )
            .await
            {
                Ok(Ok(summary)) => summary,
                Ok(Err(e)) => {
                    warn!("Summarization failed for {}: {:#}", conversation_id, e);
                    break;
                }
                Err(_) => {
                    warn!("Summarization timed out for {}", conversation_id);
                    break;
                }
            };

            let boundary = batch[batch.len() - 1].id;
            self.conversations
                .set_summary(conversation_id, &summary, boundary)
                .await?;

            conversation.summary = Some(summary);
            conversation.summary_boundary = Some(boundary);
            messages.drain(..batch_len);

            report.passes += 1;
            report.messages_compacted += batch_len;
            report.usage_after = usage_of(conversation.summary.as_deref(), &messages);

            if report.usage_after <= target {
                break;
            }
        }

        if report.passes > 0 {
            info!(
                "Compacted {}: {} messages folded in {} passes, ~{} -> ~{} tokens",
                conversation_id,
                report.messages_compacted,
                report.passes,
                report.usage_before,
                report.usage_after
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
