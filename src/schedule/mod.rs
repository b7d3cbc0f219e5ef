// src/schedule/mod.rs

//! Weekly availability schedules and the clock that resolves them.
//!
//! `resolve_status` is the only read path: a pure function from
//! (schedule, wall-clock time) to a presence status. It is called on every
//! scheduler tick for every character, so it keeps no state and does no I/O.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub mod generator;

pub const DAY_KEYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Presence status of a character at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// One contiguous block of a day. Times are "HH:MM" wall-clock strings;
/// a block wraps past midnight when `end < start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub start: String,
    pub end: String,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

/// A character's weekly timetable, keyed by lowercase day name.
/// Immutable once generated; regeneration replaces it wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklySchedule {
    #[serde(flatten)]
    pub days: HashMap<String, Vec<ScheduleBlock>>,
}

/// What the clock resolved for a character right now.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResolution {
    pub status: PresenceStatus,
    pub activity: Option<String>,
}

impl StatusResolution {
    fn offline() -> Self {
        Self {
            status: PresenceStatus::Offline,
            activity: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unknown day key '{0}'")]
    UnknownDay(String),
    #[error("invalid time '{0}', expected HH:MM")]
    BadTime(String),
    #[error("overlapping blocks on {0}")]
    OverlappingBlocks(String),
}

pub fn weekday_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn minute_of_day(time: &str) -> Result<u32, ScheduleError> {
    let (h, m) = time
        .split_once(':')
        .ok_or_else(|| ScheduleError::BadTime(time.to_string()))?;
    let hours: u32 = h
        .parse()
        .map_err(|_| ScheduleError::BadTime(time.to_string()))?;
    let minutes: u32 = m
        .parse()
        .map_err(|_| ScheduleError::BadTime(time.to_string()))?;
    if hours >= 24 || minutes >= 60 {
        return Err(ScheduleError::BadTime(time.to_string()));
    }
    Ok(hours * 60 + minutes)
}

/// Does `now` (minute of day) fall inside a block? Start-inclusive,
/// end-exclusive; wrapping blocks (`end < start`) span midnight.
fn block_covers(start: u32, end: u32, now: u32) -> bool {
    if end >= start {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// Resolve a character's presence at a local wall-clock instant.
/// The first matching block of the current day wins; no blocks or no match
/// means offline.
pub fn resolve_status(schedule: &WeeklySchedule, now: NaiveDateTime) -> StatusResolution {
    let day = weekday_key(now.weekday());
    let Some(blocks) = schedule.days.get(day) else {
        return StatusResolution::offline();
    };

    let now_min = now.hour() * 60 + now.minute();
    for block in blocks {
        let (Ok(start), Ok(end)) = (minute_of_day(&block.start), minute_of_day(&block.end)) else {
            continue;
        };
        if block_covers(start, end, now_min) {
            return StatusResolution {
                status: block.status,
                activity: block.activity.clone(),
            };
        }
    }

    StatusResolution::offline()
}

impl WeeklySchedule {
    /// Validate day keys, time formats, and the non-overlap invariant.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for (day, blocks) in &self.days {
            if !DAY_KEYS.contains(&day.as_str()) {
                return Err(ScheduleError::UnknownDay(day.clone()));
            }

            // Expand each block into minute ranges over [0, 1440) so
            // wrapping blocks check cleanly against the rest.
            let mut ranges: Vec<(usize, u32, u32)> = Vec::new();
            for (idx, block) in blocks.iter().enumerate() {
                let start = minute_of_day(&block.start)?;
                let end = minute_of_day(&block.end)?;
                if end >= start {
                    ranges.push((idx, start, end));
                } else {
                    ranges.push((idx, start, 24 * 60));
                    ranges.push((idx, 0, end));
                }
            }

            for (i, &(block_a, a_start, a_end)) in ranges.iter().enumerate() {
                for &(block_b, b_start, b_end) in ranges.iter().skip(i + 1) {
                    if block_a == block_b {
                        continue;
                    }
                    if a_start < b_end && b_start < a_end {
                        return Err(ScheduleError::OverlappingBlocks(day.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}
