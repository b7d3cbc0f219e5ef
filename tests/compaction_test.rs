// tests/compaction_test.rs
// Compaction engine: threshold trigger, the keep-uncompacted floor, and
// cumulative summary folding, against a scripted summarizer.

mod common;

use chrono::Duration;

use common::*;
use kindred::chat::ChatRole;
use kindred::schedule::PresenceStatus;
use kindred::settings::BehaviorSettings;

struct Arranged {
    world: TestWorld,
    conversation_id: String,
    settings: BehaviorSettings,
}

/// Thresholds tuned so ~40 hundred-character messages are far past the
/// trigger while the target stays effectively unreachable, making the floor
/// the only stopping rule.
fn tight_settings() -> BehaviorSettings {
    BehaviorSettings {
        compact_threshold_percent: 1.0,
        compact_target_percent: 0.5,
        ..Default::default()
    }
}

async fn arrange(settings: BehaviorSettings) -> Arranged {
    let world = build_world(FixedChance::always_pass()).await;
    let t0 = utc_of(monday_noon());
    let character_id = seed_pair(
        &world,
        "ada",
        "June",
        PresenceStatus::Online,
        t0 - Duration::hours(48),
    )
    .await;
    world.state.settings.save("ada", &settings).await.unwrap();

    let conversation_id = world
        .state
        .conversations
        .get_conversation("ada", &character_id)
        .await
        .unwrap()
        .unwrap()
        .id;

    Arranged {
        world,
        conversation_id,
        settings,
    }
}

async fn fill_messages(arranged: &Arranged, count: usize, start_minute: i64) {
    let base = utc_of(monday_noon());
    for i in 0..count {
        let role = if i % 2 == 0 {
            ChatRole::User
        } else {
            ChatRole::Character
        };
        // 100 characters -> ~25 estimated tokens per message.
        let content = format!("{:<100}", format!("message {}", i));
        arranged
            .world
            .state
            .conversations
            .append_message(
                &arranged.conversation_id,
                role,
                &content,
                base + Duration::minutes(start_minute + i as i64),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_floor_is_never_crossed() {
    let arranged = arrange(tight_settings()).await;
    fill_messages(&arranged, 40, 0).await;

    let report = arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();

    // Only the 10 messages above the 30-message floor were folded, even
    // though usage is still far above the target.
    assert_eq!(report.messages_compacted, 10);
    assert!(report.usage_after > 0);

    let conversation = arranged
        .world
        .state
        .conversations
        .get_conversation_by_id(&arranged.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.summary.as_deref(), Some("summary[10]"));
    assert!(conversation.summary_boundary.is_some());

    let tail = arranged
        .world
        .state
        .conversations
        .messages_after_boundary(&conversation)
        .await
        .unwrap();
    assert_eq!(tail.len(), 30);
    // The newest 30 messages survive verbatim.
    assert!(tail[0].content.trim_end().ends_with("message 10"));
}

#[tokio::test]
async fn test_compaction_is_cumulative() {
    let arranged = arrange(tight_settings()).await;
    fill_messages(&arranged, 40, 0).await;

    arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();

    // Twenty more turns arrive; the next pass folds the prior summary in.
    fill_messages(&arranged, 20, 100).await;
    let report = arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();
    assert_eq!(report.messages_compacted, 20);

    let conversation = arranged
        .world
        .state
        .conversations
        .get_conversation_by_id(&arranged.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.summary.as_deref(), Some("summary[20+prior]"));

    let tail = arranged
        .world
        .state
        .conversations
        .messages_after_boundary(&conversation)
        .await
        .unwrap();
    assert_eq!(tail.len(), 30);
}

#[tokio::test]
async fn test_below_threshold_is_a_no_op() {
    let arranged = arrange(BehaviorSettings::default()).await;
    fill_messages(&arranged, 5, 0).await;

    let report = arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();
    assert_eq!(report.passes, 0);
    assert_eq!(report.messages_compacted, 0);

    let conversation = arranged
        .world
        .state
        .conversations
        .get_conversation_by_id(&arranged.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.summary.is_none());
    assert_eq!(
        arranged.world.engine.summarize_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_summarizer_failure_stops_the_pass() {
    let arranged = arrange(tight_settings()).await;
    fill_messages(&arranged, 40, 0).await;

    arranged.world.engine.set_failing(true);
    let report = arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();
    assert_eq!(report.messages_compacted, 0);

    let conversation = arranged
        .world
        .state
        .conversations
        .get_conversation_by_id(&arranged.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.summary.is_none());

    // Next consultation retries cleanly.
    arranged.world.engine.set_failing(false);
    let report = arranged
        .world
        .state
        .compaction
        .maybe_compact(&arranged.conversation_id, &arranged.settings)
        .await
        .unwrap();
    assert_eq!(report.messages_compacted, 10);
}
