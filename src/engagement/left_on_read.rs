// src/engagement/left_on_read.rs

//! Left-on-read follow-up scheduler.
//!
//! Event-driven sibling of the proactive tick: when a character message is
//! read and left unanswered, a delayed check is armed in the durable
//! follow-up queue. The poller re-validates everything at fire time — the
//! user may have replied, the window may have lapsed, the budget may be
//! spent — and only then sends.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::chat::{ConversationStore, ReadEvent};
use crate::compaction::CompactionEngine;
use crate::config::CONFIG;
use crate::llm::{ContentEngine, GenerationHints};
use crate::roster::RosterStore;
use crate::settings::SettingsStore;

use super::budget::{BudgetKind, BudgetLedger};
use super::eligibility::{evaluate_left_on_read, ChanceSource, FollowUpDecision};
use super::store::{EngagementStore, FollowUpTicket, SendOutcome};
use super::{pair_key, PairLocks, TickInstant};

const DUE_BATCH_LIMIT: i64 = 50;

pub struct FollowUpScheduler {
    roster: Arc<RosterStore>,
    conversations: Arc<ConversationStore>,
    engagement: Arc<EngagementStore>,
    settings: Arc<SettingsStore>,
    budget: Arc<BudgetLedger>,
    engine: Arc<dyn ContentEngine>,
    compaction: Arc<CompactionEngine>,
    locks: Arc<PairLocks>,
    chance: Arc<dyn ChanceSource>,
    limiter: Arc<Semaphore>,
}

impl FollowUpScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        roster: Arc<RosterStore>,
        conversations: Arc<ConversationStore>,
        engagement: Arc<EngagementStore>,
        settings: Arc<SettingsStore>,
        budget: Arc<BudgetLedger>,
        engine: Arc<dyn ContentEngine>,
        compaction: Arc<CompactionEngine>,
        locks: Arc<PairLocks>,
        chance: Arc<dyn ChanceSource>,
        worker_limit: usize,
    ) -> Self {
        Self {
            roster,
            conversations,
            engagement,
            settings,
            budget,
            engine,
            compaction,
            locks,
            chance,
            limiter: Arc::new(Semaphore::new(worker_limit.max(1))),
        }
    }

    /// Arm (or re-arm) the pair's follow-up timer for a fresh read event.
    /// The delay is drawn uniformly from the user's trigger window.
    pub async fn arm_for_read(
        &self,
        user_id: &str,
        character_id: &str,
        event: &ReadEvent,
    ) -> Result<chrono::DateTime<chrono::Utc>> {
        let settings = self.settings.load(user_id).await?;
        let delay = self.chance.delay_minutes(
            settings.left_on_read_trigger_min_minutes,
            settings.left_on_read_trigger_max_minutes,
        );
        let due_at = event.read_at + chrono::Duration::minutes(delay);

        self.engagement
            .arm_follow_up(
                user_id,
                character_id,
                event.message_id,
                event.read_at,
                due_at,
            )
            .await?;

        debug!(
            "Armed follow-up for {} in {}min",
            pair_key(user_id, character_id),
            delay
        );
        Ok(due_at)
    }

    /// Fire every due queue entry. Returns how many follow-ups were sent.
    pub async fn run_due(&self, tick: TickInstant) -> Result<usize> {
        let tickets = self.engagement.due_follow_ups(tick.utc, DUE_BATCH_LIMIT).await?;
        if tickets.is_empty() {
            return Ok(0);
        }

        let outcomes = futures::future::join_all(
            tickets
                .iter()
                .map(|ticket| self.process_ticket(ticket, tick)),
        )
        .await;

        let mut fired = 0;
        for outcome in outcomes {
            match outcome {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => warn!("Follow-up processing failed: {:#}", e),
            }
        }
        Ok(fired)
    }

    async fn process_ticket(&self, ticket: &FollowUpTicket, tick: TickInstant) -> Result<bool> {
        let _permit = self.limiter.acquire().await?;

        let user_id = ticket.user_id.as_str();
        let character_id = ticket.character_id.as_str();
        let key = pair_key(user_id, character_id);

        let lock = self.locks.get_lock(&key).await;
        let Ok(_guard) = lock.try_lock() else {
            // Contended pair: leave the row, the next poll retries.
            return Ok(false);
        };

        let Some(pair_match) = self.roster.get_match(user_id, character_id).await? else {
            self.engagement.cancel_follow_up(user_id, character_id).await?;
            return Ok(false);
        };
        if !pair_match.is_active() {
            self.engagement.cancel_follow_up(user_id, character_id).await?;
            return Ok(false);
        }

        let Some(conversation) = self
            .conversations
            .get_conversation(user_id, character_id)
            .await?
        else {
            self.engagement.cancel_follow_up(user_id, character_id).await?;
            return Ok(false);
        };

        let settings = self.settings.load(user_id).await?;
        let state = self
            .engagement
            .get_or_create(user_id, character_id, tick.utc)
            .await?;
        let day = tick.day_key();
        let daily_count = self
            .budget
            .sent_today(user_id, &day, BudgetKind::LeftOnRead)
            .await?;
        let user_replied = self
            .conversations
            .user_replied_since(&conversation.id, ticket.read_at)
            .await?;

        match evaluate_left_on_read(
            &state,
            &settings,
            tick.utc,
            ticket.read_at,
            daily_count,
            user_replied,
        ) {
            FollowUpDecision::Send => {}
            FollowUpDecision::Hold(reason) => {
                debug!("Dropping follow-up for {}: {}", key, reason);
                if reason.is_terminal() {
                    self.engagement.cancel_follow_up(user_id, character_id).await?;
                }
                return Ok(false);
            }
        }

        let Some(character) = self.roster.get_character(character_id).await? else {
            self.engagement.cancel_follow_up(user_id, character_id).await?;
            return Ok(false);
        };
        let last_read = self
            .conversations
            .get_message(ticket.message_id)
            .await?
            .map(|m| m.content)
            .unwrap_or_default();
        let hints = GenerationHints {
            pacing: settings.pacing_style,
            max_emojis: settings.max_emojis_per_message,
        };

        let content = match tokio::time::timeout(
            CONFIG.llm_timeout(),
            self.engine
                .generate_left_on_read_message(&character, &last_read, &hints),
        )
        .await
        {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                // Transient: keep the row, retry while the window allows.
                warn!("Follow-up generation failed for {}: {:#}", key, e);
                return Ok(false);
            }
            Err(_) => {
                warn!("Follow-up generation timed out for {}", key);
                return Ok(false);
            }
        };

        match self
            .engagement
            .commit_follow_up_send(
                user_id,
                character_id,
                &conversation.id,
                &content,
                &day,
                tick.utc,
                &settings,
            )
            .await?
        {
            SendOutcome::Sent { .. } => {
                info!("Left-on-read follow-up sent for {}", key);
                if let Err(e) = self
                    .compaction
                    .maybe_compact(&conversation.id, &settings)
                    .await
                {
                    warn!("Compaction after follow-up failed: {:#}", e);
                }
                Ok(true)
            }
            SendOutcome::BudgetExhausted => {
                // Definitive for today; drop the timer.
                debug!("Budget refused follow-up slot for {}", key);
                self.engagement.cancel_follow_up(user_id, character_id).await?;
                Ok(false)
            }
            SendOutcome::PairGone => {
                debug!("Pair {} vanished mid-follow-up, discarding result", key);
                Ok(false)
            }
        }
    }
}
