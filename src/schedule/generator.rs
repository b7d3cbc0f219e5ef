// src/schedule/generator.rs

//! Weekly schedule generation.
//!
//! Schedules come from the LLM collaborator (shaped by the character's
//! persona) and fall back to a built-in timetable when generation fails or
//! produces an invalid table.

use std::time::Duration;

use tracing::warn;

use crate::llm::ContentEngine;
use crate::roster::Character;
use crate::schedule::{PresenceStatus, ScheduleBlock, WeeklySchedule, DAY_KEYS};

/// Generate a weekly schedule for a character, falling back to the default
/// timetable on collaborator failure or an invalid result.
pub async fn schedule_for(
    engine: &dyn ContentEngine,
    character: &Character,
    timeout: Duration,
) -> WeeklySchedule {
    match tokio::time::timeout(timeout, engine.generate_weekly_schedule(character)).await {
        Ok(Ok(schedule)) => match schedule.validate() {
            Ok(()) => schedule,
            Err(e) => {
                warn!(
                    "Generated schedule for '{}' failed validation ({}), using default",
                    character.name, e
                );
                default_weekly_schedule()
            }
        },
        Ok(Err(e)) => {
            warn!(
                "Schedule generation for '{}' failed: {:#}, using default",
                character.name, e
            );
            default_weekly_schedule()
        }
        Err(_) => {
            warn!(
                "Schedule generation for '{}' timed out, using default",
                character.name
            );
            default_weekly_schedule()
        }
    }
}

fn block(start: &str, end: &str, status: PresenceStatus, activity: &str) -> ScheduleBlock {
    ScheduleBlock {
        start: start.to_string(),
        end: end.to_string(),
        status,
        activity: Some(activity.to_string()),
    }
}

/// Deterministic fallback timetable: working weekdays, looser weekends.
/// Every day is fully covered, including wrapping sleep blocks.
pub fn default_weekly_schedule() -> WeeklySchedule {
    let weekday = vec![
        block("07:30", "09:00", PresenceStatus::Online, "coffee and phone"),
        block("09:00", "17:30", PresenceStatus::Busy, "at work"),
        block("17:30", "19:00", PresenceStatus::Away, "gym"),
        block("19:00", "23:30", PresenceStatus::Online, "free evening"),
        block("23:30", "07:30", PresenceStatus::Offline, "asleep"),
    ];
    let weekend = vec![
        block("10:00", "12:00", PresenceStatus::Online, "slow morning"),
        block("12:00", "16:00", PresenceStatus::Away, "out and about"),
        block("16:00", "18:00", PresenceStatus::Online, "chilling at home"),
        block("18:00", "20:00", PresenceStatus::Busy, "dinner with friends"),
        block("20:00", "01:00", PresenceStatus::Online, "late night chatting"),
        block("01:00", "10:00", PresenceStatus::Offline, "asleep"),
    ];

    let mut schedule = WeeklySchedule::default();
    for day in DAY_KEYS {
        let blocks = if day == "saturday" || day == "sunday" {
            weekend.clone()
        } else {
            weekday.clone()
        };
        schedule.days.insert(day.to_string(), blocks);
    }
    schedule
}
