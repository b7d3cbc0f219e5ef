// src/state.rs

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chat::{ConversationStore, MessageService};
use crate::compaction::CompactionEngine;
use crate::engagement::eligibility::ChanceSource;
use crate::engagement::{
    BudgetLedger, EngagementStore, FollowUpScheduler, PairLocks, ProactiveScheduler,
};
use crate::llm::ContentEngine;
use crate::roster::RosterStore;
use crate::settings::SettingsStore;

pub struct AppState {
    // -------- Storage --------
    pub pool: SqlitePool,
    pub roster: Arc<RosterStore>,
    pub conversations: Arc<ConversationStore>,
    pub engagement: Arc<EngagementStore>,
    pub settings: Arc<SettingsStore>,
    pub budget: Arc<BudgetLedger>,

    // -------- Collaborators --------
    pub content_engine: Arc<dyn ContentEngine>,

    // -------- Services --------
    pub compaction: Arc<CompactionEngine>,
    pub messages: Arc<MessageService>,
    pub proactive: Arc<ProactiveScheduler>,
    pub follow_up: Arc<FollowUpScheduler>,
    pub pair_locks: Arc<PairLocks>,
}

impl AppState {
    /// Wire up stores, services, and both schedulers over one pool.
    /// The content engine and chance source are injected so tests can pin
    /// generation and randomness.
    pub fn assemble(
        pool: SqlitePool,
        content_engine: Arc<dyn ContentEngine>,
        chance: Arc<dyn ChanceSource>,
        worker_limit: usize,
    ) -> Arc<AppState> {
        let roster = Arc::new(RosterStore::new(pool.clone()));
        let conversations = Arc::new(ConversationStore::new(pool.clone()));
        let engagement = Arc::new(EngagementStore::new(pool.clone()));
        let settings = Arc::new(SettingsStore::new(pool.clone()));
        let budget = Arc::new(BudgetLedger::new(pool.clone()));
        let pair_locks = Arc::new(PairLocks::new());

        let compaction = Arc::new(CompactionEngine::new(
            conversations.clone(),
            content_engine.clone(),
        ));

        let messages = Arc::new(MessageService::new(
            roster.clone(),
            conversations.clone(),
            engagement.clone(),
            settings.clone(),
            compaction.clone(),
        ));

        let proactive = Arc::new(ProactiveScheduler::new(
            roster.clone(),
            conversations.clone(),
            engagement.clone(),
            settings.clone(),
            budget.clone(),
            content_engine.clone(),
            compaction.clone(),
            pair_locks.clone(),
            chance.clone(),
            worker_limit,
        ));

        let follow_up = Arc::new(FollowUpScheduler::new(
            roster.clone(),
            conversations.clone(),
            engagement.clone(),
            settings.clone(),
            budget.clone(),
            content_engine.clone(),
            compaction.clone(),
            pair_locks.clone(),
            chance,
            worker_limit,
        ));

        Arc::new(AppState {
            pool,
            roster,
            conversations,
            engagement,
            settings,
            budget,
            content_engine,
            compaction,
            messages,
            proactive,
            follow_up,
            pair_locks,
        })
    }
}
