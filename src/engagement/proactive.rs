// src/engagement/proactive.rs

//! Proactive message scheduler.
//!
//! The tick driver fans out over every active pair of every due user,
//! resolves presence, runs eligibility, and on success asks the content
//! engine for an opener and commits the send transactionally. A pair walks
//! IDLE -> ELIGIBLE -> SENDING -> COOLDOWN each cycle, and lands in
//! UNMATCHED when the character finally gives up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::chat::ConversationStore;
use crate::compaction::CompactionEngine;
use crate::config::CONFIG;
use crate::llm::{ContentEngine, GenerationHints};
use crate::roster::RosterStore;
use crate::schedule::{resolve_status, PresenceStatus};
use crate::settings::{BehaviorSettings, SettingsStore};

use super::budget::{BudgetKind, BudgetLedger};
use super::eligibility::{evaluate_proactive, ChanceSource, ProactiveDecision};
use super::store::{EngagementStore, SendOutcome};
use super::{pair_key, PairLocks, TickInstant};

/// What one pair did during a tick, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOutcome {
    Sent,
    SentAndUnmatched,
    Held,
    Skipped,
    Failed,
}

/// Aggregate result of one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub evaluated: usize,
    pub sent: usize,
    pub unmatched: usize,
    pub failures: usize,
}

pub struct ProactiveScheduler {
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
    /// When each user was last evaluated; gates the per-user check interval
    /// against the process-wide driver cadence. In-memory on purpose: a
    /// restart just re-evaluates everyone once.
    last_evaluated: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ProactiveScheduler {
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
            last_evaluated: Mutex::new(HashMap::new()),
        }
    }

    /// One driver tick: fan out across all due users and their active
    /// pairs. Pairs run concurrently, bounded by the worker pool; each
    /// pair's own work stays serialized behind its lock.
    pub async fn run_tick(&self, tick: TickInstant) -> Result<TickReport> {
        let users = self.roster.active_user_ids().await?;
        let mut report = TickReport::default();

        for user_id in users {
            let settings = match self.settings.load(&user_id).await {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to load settings for {}: {:#}", user_id, e);
                    continue;
                }
            };

            if !self.user_is_due(&user_id, &settings, tick.utc) {
                continue;
            }

            let matches = self.roster.active_matches_for_user(&user_id).await?;
            let outcomes = futures::future::join_all(matches.iter().map(|m| {
                self.process_pair(&user_id, &m.character_id, &settings, tick)
            }))
            .await;

            for outcome in outcomes {
                report.evaluated += 1;
                match outcome {
                    Ok(PairOutcome::Sent) => report.sent += 1,
                    Ok(PairOutcome::SentAndUnmatched) => {
                        report.sent += 1;
                        report.unmatched += 1;
                    }
                    Ok(PairOutcome::Held) | Ok(PairOutcome::Skipped) => {}
                    Ok(PairOutcome::Failed) => report.failures += 1,
                    Err(e) => {
                        report.failures += 1;
                        warn!("Proactive pair processing failed: {:#}", e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Honor the per-user check interval against the driver's base cadence.
    fn user_is_due(
        &self,
        user_id: &str,
        settings: &BehaviorSettings,
        now: DateTime<Utc>,
    ) -> bool {
        let interval = Duration::minutes(settings.proactive_check_interval_minutes);
        let mut last = self.last_evaluated.lock().unwrap_or_else(|e| e.into_inner());
        match last.get(user_id) {
            Some(&at) if now - at < interval => false,
            _ => {
                last.insert(user_id.to_string(), now);
                true
            }
        }
    }

    async fn process_pair(
        &self,
        user_id: &str,
        character_id: &str,
        settings: &BehaviorSettings,
        tick: TickInstant,
    ) -> Result<PairOutcome> {
        let _permit = self.limiter.acquire().await?;

        let key = pair_key(user_id, character_id);
        let lock = self.locks.get_lock(&key).await;
        let Ok(_guard) = lock.try_lock() else {
            // Another task holds the pair; that task wins this round.
            return Ok(PairOutcome::Skipped);
        };

        let presence = match self.roster.load_schedule(character_id).await? {
            Some(schedule) => resolve_status(&schedule, tick.local),
            None => {
                debug!("No schedule for character {}, treating as offline", character_id);
                return Ok(PairOutcome::Held);
            }
        };
        if presence.status == PresenceStatus::Offline {
            return Ok(PairOutcome::Held);
        }

        let state = self
            .engagement
            .get_or_create(user_id, character_id, tick.utc)
            .await?;
        let day = tick.day_key();
        let daily_count = self
            .budget
            .sent_today(user_id, &day, BudgetKind::Proactive)
            .await?;

        match evaluate_proactive(
            &state,
            settings,
            presence.status,
            tick.utc,
            daily_count,
            self.chance.as_ref(),
        ) {
            ProactiveDecision::Send => {}
            ProactiveDecision::Hold(reason) => {
                debug!("Holding proactive for {}: {}", key, reason);
                return Ok(PairOutcome::Held);
            }
        }

        let Some(character) = self.roster.get_character(character_id).await? else {
            return Ok(PairOutcome::Skipped);
        };
        let hints = GenerationHints {
            pacing: settings.pacing_style,
            max_emojis: settings.max_emojis_per_message,
        };

        let content = match tokio::time::timeout(
            CONFIG.llm_timeout(),
            self.engine
                .generate_proactive_message(&character, &presence, &hints),
        )
        .await
        {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                // No state mutated: the pair is naturally retried next tick.
                warn!("Proactive generation failed for {}: {:#}", key, e);
                return Ok(PairOutcome::Failed);
            }
            Err(_) => {
                warn!("Proactive generation timed out for {}", key);
                return Ok(PairOutcome::Failed);
            }
        };

        let conversation = self
            .conversations
            .ensure_conversation(user_id, character_id)
            .await?;

        match self
            .engagement
            .commit_proactive_send(
                user_id,
                character_id,
                &conversation.id,
                &content,
                &day,
                tick.utc,
                settings,
            )
            .await?
        {
            SendOutcome::Sent { unmatched, .. } => {
                info!(
                    "Proactive message sent for {} ({} while {})",
                    key,
                    character.name,
                    presence.status.as_str()
                );

                if let Err(e) = self
                    .compaction
                    .maybe_compact(&conversation.id, settings)
                    .await
                {
                    warn!("Compaction after proactive send failed: {:#}", e);
                }

                if unmatched {
                    info!(
                        "{} gave up on {} after {} unanswered messages",
                        character.name, user_id, settings.max_consecutive_proactive
                    );
                    Ok(PairOutcome::SentAndUnmatched)
                } else {
                    Ok(PairOutcome::Sent)
                }
            }
            SendOutcome::BudgetExhausted => {
                debug!("Budget refused proactive slot for {}", key);
                Ok(PairOutcome::Held)
            }
            SendOutcome::PairGone => {
                debug!("Pair {} vanished mid-send, discarding result", key);
                Ok(PairOutcome::Skipped)
            }
        }
    }
}
