// src/engagement/eligibility.rs

//! Pure eligibility decisions for both trigger types.
//!
//! Every function here is a deterministic mapping from state snapshots to a
//! verdict; randomness comes in only through the injected `ChanceSource`, so
//! tests can pin rolls to either side of a probability gate.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::schedule::PresenceStatus;
use crate::settings::BehaviorSettings;

use super::EngagementState;

/// Injectable randomness for probability gates and trigger delays.
pub trait ChanceSource: Send + Sync {
    /// Uniform draw over [0, 100).
    fn roll_percent(&self) -> f64;
    /// Uniform delay in whole minutes over [min, max].
    fn delay_minutes(&self, min: i64, max: i64) -> i64;
}

pub struct ThreadRngChance;

impl ChanceSource for ThreadRngChance {
    fn roll_percent(&self) -> f64 {
        rand::rng().random_range(0.0..100.0)
    }

    fn delay_minutes(&self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}

/// Why a proactive send is held back right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    Offline,
    CoolingDown,
    DailyCapReached,
    RecentConversation,
    GaveUp,
    LostRoll,
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HoldReason::Offline => "offline",
            HoldReason::CoolingDown => "cooling down",
            HoldReason::DailyCapReached => "daily cap reached",
            HoldReason::RecentConversation => "conversation too recent",
            HoldReason::GaveUp => "gave up on this pair",
            HoldReason::LostRoll => "lost the roll",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProactiveDecision {
    Send,
    Hold(HoldReason),
}

/// May this pair fire a proactive message right now?
///
/// Gate order follows escalating cost: presence, cooldown, budget, recency,
/// terminal counter, and only then the probability roll. Online presence has
/// no probability gate: being online is itself the trigger.
pub fn evaluate_proactive(
    state: &EngagementState,
    settings: &BehaviorSettings,
    status: PresenceStatus,
    now: DateTime<Utc>,
    daily_count: i64,
    chance: &dyn ChanceSource,
) -> ProactiveDecision {
    if status == PresenceStatus::Offline {
        return ProactiveDecision::Hold(HoldReason::Offline);
    }
    if let Some(until) = state.proactive_cooldown_until {
        if now < until {
            return ProactiveDecision::Hold(HoldReason::CoolingDown);
        }
    }
    if daily_count >= settings.daily_proactive_limit {
        return ProactiveDecision::Hold(HoldReason::DailyCapReached);
    }
    if now - state.last_message_at < Duration::hours(settings.proactive_message_hours) {
        return ProactiveDecision::Hold(HoldReason::RecentConversation);
    }
    if state.consecutive_unanswered_proactive >= settings.max_consecutive_proactive {
        // Terminal: the pair should already have been unmatched when the
        // counter hit the cap, so this only guards stale state.
        return ProactiveDecision::Hold(HoldReason::GaveUp);
    }

    let passed = match status {
        PresenceStatus::Online => true,
        PresenceStatus::Away => chance.roll_percent() < settings.proactive_away_chance,
        PresenceStatus::Busy => chance.roll_percent() < settings.proactive_busy_chance,
        PresenceStatus::Offline => unreachable!("rejected above"),
    };

    if passed {
        ProactiveDecision::Send
    } else {
        ProactiveDecision::Hold(HoldReason::LostRoll)
    }
}

/// Escalating backoff after a successful proactive send: with the unanswered
/// counter now at `consecutive_after`, the next send waits
/// `60min × multiplier^consecutive_after`.
pub fn proactive_cooldown_after(
    settings: &BehaviorSettings,
    consecutive_after: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let hours = settings
        .proactive_cooldown_multiplier
        .powi(consecutive_after as i32);
    now + Duration::seconds((hours * 3600.0) as i64)
}

/// Why a left-on-read follow-up is rejected at fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpHold {
    DailyCapReached,
    CoolingDown,
    TooEarly,
    WindowPassed,
    UserReplied,
}

impl FollowUpHold {
    /// Holds that can never succeed later for this read event; the armed
    /// timer should be dropped rather than retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FollowUpHold::TooEarly)
    }
}

impl std::fmt::Display for FollowUpHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FollowUpHold::DailyCapReached => "daily cap reached",
            FollowUpHold::CoolingDown => "cooling down",
            FollowUpHold::TooEarly => "too early",
            FollowUpHold::WindowPassed => "trigger window passed",
            FollowUpHold::UserReplied => "user replied",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpDecision {
    Send,
    Hold(FollowUpHold),
}

/// May this pair fire a left-on-read follow-up right now? No probability
/// gate here: the randomized delay inside the trigger window is the only
/// randomness.
pub fn evaluate_left_on_read(
    state: &EngagementState,
    settings: &BehaviorSettings,
    now: DateTime<Utc>,
    read_at: DateTime<Utc>,
    daily_count: i64,
    user_replied: bool,
) -> FollowUpDecision {
    if daily_count >= settings.daily_left_on_read_limit {
        return FollowUpDecision::Hold(FollowUpHold::DailyCapReached);
    }
    if let Some(until) = state.left_on_read_cooldown_until {
        if now < until {
            return FollowUpDecision::Hold(FollowUpHold::CoolingDown);
        }
    }

    let elapsed = now - read_at;
    if elapsed < Duration::minutes(settings.left_on_read_trigger_min_minutes) {
        return FollowUpDecision::Hold(FollowUpHold::TooEarly);
    }
    if elapsed > Duration::minutes(settings.left_on_read_trigger_max_minutes) {
        return FollowUpDecision::Hold(FollowUpHold::WindowPassed);
    }

    if user_replied {
        return FollowUpDecision::Hold(FollowUpHold::UserReplied);
    }

    FollowUpDecision::Send
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chance source pinned to fixed values.
    pub struct FixedChance {
        pub roll: f64,
        pub delay: i64,
    }

    impl ChanceSource for FixedChance {
        fn roll_percent(&self) -> f64 {
            self.roll
        }

        fn delay_minutes(&self, _min: i64, _max: i64) -> i64 {
            self.delay
        }
    }

    fn state_at(last_message_at: DateTime<Utc>) -> EngagementState {
        EngagementState {
            user_id: "u".to_string(),
            character_id: "c".to_string(),
            last_message_at,
            last_proactive_at: None,
            consecutive_unanswered_proactive: 0,
            proactive_cooldown_until: None,
            last_left_on_read_at: None,
            left_on_read_cooldown_until: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn settings() -> BehaviorSettings {
        BehaviorSettings::default()
    }

    fn chance(roll: f64) -> FixedChance {
        FixedChance { roll, delay: 0 }
    }

    #[test]
    fn test_offline_never_fires() {
        let now = t0();
        let state = state_at(now - Duration::hours(48));
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Offline,
            now,
            0,
            &chance(0.0),
        );
        assert_eq!(decision, ProactiveDecision::Hold(HoldReason::Offline));
    }

    #[test]
    fn test_cooldown_blocks_until_elapsed() {
        let now = t0();
        let mut state = state_at(now - Duration::hours(48));
        state.proactive_cooldown_until = Some(now + Duration::minutes(1));

        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            0,
            &chance(0.0),
        );
        assert_eq!(decision, ProactiveDecision::Hold(HoldReason::CoolingDown));

        state.proactive_cooldown_until = Some(now);
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            0,
            &chance(0.0),
        );
        assert_eq!(decision, ProactiveDecision::Send);
    }

    #[test]
    fn test_daily_cap_blocks_regardless_of_everything_else() {
        let now = t0();
        let state = state_at(now - Duration::hours(48));
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            5,
            &chance(0.0),
        );
        assert_eq!(
            decision,
            ProactiveDecision::Hold(HoldReason::DailyCapReached)
        );
    }

    #[test]
    fn test_recent_conversation_blocks() {
        let now = t0();
        let state = state_at(now - Duration::hours(2));
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            0,
            &chance(0.0),
        );
        assert_eq!(
            decision,
            ProactiveDecision::Hold(HoldReason::RecentConversation)
        );
    }

    #[test]
    fn test_exhausted_pair_never_fires() {
        let now = t0();
        let mut state = state_at(now - Duration::hours(48));
        state.consecutive_unanswered_proactive = 4;
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            0,
            &chance(0.0),
        );
        assert_eq!(decision, ProactiveDecision::Hold(HoldReason::GaveUp));
    }

    #[test]
    fn test_away_roll_boundaries() {
        // Default away chance is 50%: a 49 roll passes, a 51 roll loses.
        let now = t0();
        let state = state_at(now - Duration::hours(48));

        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Away,
            now,
            0,
            &chance(49.0),
        );
        assert_eq!(decision, ProactiveDecision::Send);

        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Away,
            now,
            0,
            &chance(51.0),
        );
        assert_eq!(decision, ProactiveDecision::Hold(HoldReason::LostRoll));
    }

    #[test]
    fn test_busy_roll_boundaries() {
        let now = t0();
        let state = state_at(now - Duration::hours(48));

        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Busy,
            now,
            0,
            &chance(9.0),
        );
        assert_eq!(decision, ProactiveDecision::Send);

        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Busy,
            now,
            0,
            &chance(10.0),
        );
        assert_eq!(decision, ProactiveDecision::Hold(HoldReason::LostRoll));
    }

    #[test]
    fn test_online_has_no_probability_gate() {
        let now = t0();
        let state = state_at(now - Duration::hours(48));
        let decision = evaluate_proactive(
            &state,
            &settings(),
            PresenceStatus::Online,
            now,
            0,
            &chance(99.9),
        );
        assert_eq!(decision, ProactiveDecision::Send);
    }

    #[test]
    fn test_cooldown_escalation() {
        let now = t0();
        let settings = settings();

        // 0 -> 1 unanswered: 60min * 2^1 = 120min
        let until = proactive_cooldown_after(&settings, 1, now);
        assert_eq!(until, now + Duration::minutes(120));

        // 1 -> 2 unanswered: 60min * 2^2 = 240min
        let until = proactive_cooldown_after(&settings, 2, now);
        assert_eq!(until, now + Duration::minutes(240));
    }

    #[test]
    fn test_left_on_read_window() {
        let settings = settings();
        let read_at = t0();
        let state = state_at(read_at - Duration::hours(1));

        // 3 minutes after read: too early
        let decision = evaluate_left_on_read(
            &state,
            &settings,
            read_at + Duration::minutes(3),
            read_at,
            0,
            false,
        );
        assert_eq!(decision, FollowUpDecision::Hold(FollowUpHold::TooEarly));
        assert!(!FollowUpHold::TooEarly.is_terminal());

        // 10 minutes: inside the window
        let decision = evaluate_left_on_read(
            &state,
            &settings,
            read_at + Duration::minutes(10),
            read_at,
            0,
            false,
        );
        assert_eq!(decision, FollowUpDecision::Send);

        // 20 minutes: window passed
        let decision = evaluate_left_on_read(
            &state,
            &settings,
            read_at + Duration::minutes(20),
            read_at,
            0,
            false,
        );
        assert_eq!(decision, FollowUpDecision::Hold(FollowUpHold::WindowPassed));
        assert!(FollowUpHold::WindowPassed.is_terminal());
    }

    #[test]
    fn test_left_on_read_reply_cancels() {
        let settings = settings();
        let read_at = t0();
        let state = state_at(read_at);

        let decision = evaluate_left_on_read(
            &state,
            &settings,
            read_at + Duration::minutes(10),
            read_at,
            0,
            true,
        );
        assert_eq!(decision, FollowUpDecision::Hold(FollowUpHold::UserReplied));
    }

    #[test]
    fn test_left_on_read_budget_and_cooldown() {
        let settings = settings();
        let read_at = t0();
        let now = read_at + Duration::minutes(10);
        let mut state = state_at(read_at);

        let decision = evaluate_left_on_read(&state, &settings, now, read_at, 10, false);
        assert_eq!(
            decision,
            FollowUpDecision::Hold(FollowUpHold::DailyCapReached)
        );

        state.left_on_read_cooldown_until = Some(now + Duration::minutes(30));
        let decision = evaluate_left_on_read(&state, &settings, now, read_at, 0, false);
        assert_eq!(decision, FollowUpDecision::Hold(FollowUpHold::CoolingDown));
    }
}
