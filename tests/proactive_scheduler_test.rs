// tests/proactive_scheduler_test.rs
// Proactive scheduler end-to-end: eligibility gates, escalating cooldowns,
// shared daily budgets, auto-unmatch, and failure handling — all against an
// in-memory database with scripted collaborators and fixed clocks.

mod common;

use chrono::Duration;

use common::*;
use kindred::engagement::budget::BudgetKind;
use kindred::roster::MatchStatus;
use kindred::schedule::PresenceStatus;
use kindred::settings::BehaviorSettings;

/// Settings that keep the recency gate out of the way so cooldown and budget
/// behavior is what the tests observe.
fn eager_settings() -> BehaviorSettings {
    BehaviorSettings {
        proactive_message_hours: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_tick_sends_and_escalates_cooldown() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;

    world.state.settings.save("ada", &eager_settings()).await.unwrap();

    let report = world.state.proactive.run_tick(t0).await.unwrap();
    assert_eq!(report.sent, 1);

    let state = world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .expect("state row");
    assert_eq!(state.consecutive_unanswered_proactive, 1);
    // 60min * 2^1
    assert_eq!(
        state.proactive_cooldown_until,
        Some(t0.utc + Duration::minutes(120))
    );
    assert_eq!(state.last_proactive_at, Some(t0.utc));

    assert_eq!(
        world
            .state
            .budget
            .sent_today("ada", &t0.day_key(), BudgetKind::Proactive)
            .await
            .unwrap(),
        1
    );

    // Second send escalates: cooldown doubles again.
    let t1 = tick_at(monday_noon() + Duration::minutes(121));
    let report = world.state.proactive.run_tick(t1).await.unwrap();
    assert_eq!(report.sent, 1);

    let state = world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_unanswered_proactive, 2);
    // 60min * 2^2
    assert_eq!(
        state.proactive_cooldown_until,
        Some(t1.utc + Duration::minutes(240))
    );
}

#[tokio::test]
async fn test_tick_is_idempotent() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;
    world.state.settings.save("ada", &eager_settings()).await.unwrap();

    // Same tick twice: at most one send.
    world.state.proactive.run_tick(t0).await.unwrap();
    world.state.proactive.run_tick(t0).await.unwrap();

    // And a re-evaluation minutes later is held by the committed cooldown.
    let t1 = tick_at(monday_noon() + Duration::minutes(6));
    let report = world.state.proactive.run_tick(t1).await.unwrap();
    assert_eq!(report.sent, 0);

    let conversation = world
        .state
        .conversations
        .get_conversation("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    let messages = world
        .state
        .conversations
        .recent_messages(&conversation.id, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_daily_cap_is_enforced() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon() - Duration::hours(6));
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;

    let settings = BehaviorSettings {
        daily_proactive_limit: 2,
        ..eager_settings()
    };
    world.state.settings.save("ada", &settings).await.unwrap();

    assert_eq!(world.state.proactive.run_tick(t0).await.unwrap().sent, 1);
    let t1 = tick_at(t0.local + Duration::minutes(121));
    assert_eq!(world.state.proactive.run_tick(t1).await.unwrap().sent, 1);

    // Third eligible tick the same day: cap refuses regardless.
    let t2 = tick_at(t1.local + Duration::minutes(241));
    assert_eq!(t0.day_key(), t2.day_key());
    assert_eq!(world.state.proactive.run_tick(t2).await.unwrap().sent, 0);

    assert_eq!(
        world
            .state
            .budget
            .sent_today("ada", &t0.day_key(), BudgetKind::Proactive)
            .await
            .unwrap(),
        2
    );

    let conversation = world
        .state
        .conversations
        .get_conversation("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        world
            .state
            .conversations
            .recent_messages(&conversation.id, 10)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_budget_is_shared_across_characters() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let early = t0.utc - Duration::hours(48);
    seed_pair(&world, "ada", "June", PresenceStatus::Online, early).await;
    seed_pair(&world, "ada", "Theo", PresenceStatus::Online, early).await;

    let settings = BehaviorSettings {
        daily_proactive_limit: 1,
        ..eager_settings()
    };
    world.state.settings.save("ada", &settings).await.unwrap();

    // Two eligible characters, one shared slot.
    let report = world.state.proactive.run_tick(t0).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(
        world
            .state
            .budget
            .sent_today("ada", &t0.day_key(), BudgetKind::Proactive)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_auto_unmatch_after_max_consecutive() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;

    let settings = BehaviorSettings {
        max_consecutive_proactive: 2,
        ..eager_settings()
    };
    world.state.settings.save("ada", &settings).await.unwrap();

    assert_eq!(world.state.proactive.run_tick(t0).await.unwrap().sent, 1);

    // The final unanswered send flips the pair to unmatched.
    let t1 = tick_at(t0.local + Duration::minutes(121));
    let report = world.state.proactive.run_tick(t1).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.unmatched, 1);

    let pair_match = world
        .state
        .roster
        .get_match("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pair_match.status, MatchStatus::Ended);
    assert_eq!(pair_match.ended_reason.as_deref(), Some("gave_up"));

    // Scheduler state is gone with the match.
    assert!(world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .is_none());

    // A later tick never fires for the dead pair.
    let t2 = tick_at(t1.local + Duration::minutes(241));
    let report = world.state.proactive.run_tick(t2).await.unwrap();
    assert_eq!(report.evaluated, 0);
    assert_eq!(report.sent, 0);
}

#[tokio::test]
async fn test_offline_character_never_fires() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Offline,
        t0.utc - Duration::hours(48),
    )
    .await;
    world.state.settings.save("ada", &eager_settings()).await.unwrap();

    let report = world.state.proactive.run_tick(t0).await.unwrap();
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.sent, 0);
}

#[tokio::test]
async fn test_collaborator_failure_mutates_nothing() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;
    world.state.settings.save("ada", &eager_settings()).await.unwrap();

    world.engine.set_failing(true);
    let report = world.state.proactive.run_tick(t0).await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failures, 1);

    // No message, no budget spend, no cooldown: the pair retries next tick.
    let state = world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_unanswered_proactive, 0);
    assert!(state.proactive_cooldown_until.is_none());
    assert_eq!(
        world
            .state
            .budget
            .sent_today("ada", &t0.day_key(), BudgetKind::Proactive)
            .await
            .unwrap(),
        0
    );

    // Recovery on a later tick.
    world.engine.set_failing(false);
    let t1 = tick_at(t0.local + Duration::minutes(6));
    assert_eq!(world.state.proactive.run_tick(t1).await.unwrap().sent, 1);
}

#[tokio::test]
async fn test_user_reply_resets_the_counter_and_cooldown() {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = tick_at(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0.utc - Duration::hours(48),
    )
    .await;
    world.state.settings.save("ada", &eager_settings()).await.unwrap();

    world.state.proactive.run_tick(t0).await.unwrap();
    let state = world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_unanswered_proactive, 1);

    world
        .state
        .messages
        .post_user_message("ada", &character_id, "sorry, busy day!")
        .await
        .unwrap();

    let state = world
        .state
        .engagement
        .get("ada", &character_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.consecutive_unanswered_proactive, 0);
    assert!(state.proactive_cooldown_until.is_none());
}
