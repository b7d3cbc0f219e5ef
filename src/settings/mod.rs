// src/settings/mod.rs

//! Per-user behavior settings.
//!
//! Every threshold, probability, and cooldown the schedulers consult lives
//! here; nothing is hard-coded in the decision logic. Invalid combinations
//! are rejected at save time so the schedulers only ever see valid values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod store;

pub use store::SettingsStore;

/// How eagerly a character paces its messages; passed to generation as a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingStyle {
    Relaxed,
    Balanced,
    Eager,
}

impl PacingStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacingStyle::Relaxed => "relaxed",
            PacingStyle::Balanced => "balanced",
            PacingStyle::Eager => "eager",
        }
    }
}

impl std::str::FromStr for PacingStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relaxed" => Ok(PacingStyle::Relaxed),
            "balanced" => Ok(PacingStyle::Balanced),
            "eager" => Ok(PacingStyle::Eager),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSettings {
    // ── Generation hints
    pub max_emojis_per_message: u32,
    pub pacing_style: PacingStyle,

    // ── Proactive messaging
    pub proactive_message_hours: i64,
    pub daily_proactive_limit: i64,
    pub proactive_away_chance: f64,
    pub proactive_busy_chance: f64,
    pub proactive_check_interval_minutes: i64,
    pub max_consecutive_proactive: i64,
    pub proactive_cooldown_multiplier: f64,

    // ── Left-on-read follow-ups
    pub daily_left_on_read_limit: i64,
    pub left_on_read_trigger_min_minutes: i64,
    pub left_on_read_trigger_max_minutes: i64,
    pub left_on_read_character_cooldown_minutes: i64,

    // ── Conversation compaction
    pub compact_threshold_percent: f64,
    pub compact_target_percent: f64,
    pub keep_uncompacted_messages: i64,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            max_emojis_per_message: 2,
            pacing_style: PacingStyle::Balanced,
            proactive_message_hours: 4,
            daily_proactive_limit: 5,
            proactive_away_chance: 50.0,
            proactive_busy_chance: 10.0,
            proactive_check_interval_minutes: 5,
            max_consecutive_proactive: 4,
            proactive_cooldown_multiplier: 2.0,
            daily_left_on_read_limit: 10,
            left_on_read_trigger_min_minutes: 5,
            left_on_read_trigger_max_minutes: 15,
            left_on_read_character_cooldown_minutes: 120,
            compact_threshold_percent: 90.0,
            compact_target_percent: 70.0,
            keep_uncompacted_messages: 30,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("left-on-read trigger window is inverted: min {min} > max {max}")]
    TriggerWindowInverted { min: i64, max: i64 },
    #[error("compaction target {target}% must be below the threshold {threshold}%")]
    CompactTargetNotBelowThreshold { target: f64, threshold: f64 },
    #[error("{field} must be between 0 and 100")]
    PercentOutOfRange { field: &'static str },
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("proactive cooldown multiplier must be at least 1.0")]
    MultiplierBelowOne,
}

impl BehaviorSettings {
    /// Validate invariants before persisting. The schedulers assume settings
    /// read from the store have already passed this.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.left_on_read_trigger_min_minutes > self.left_on_read_trigger_max_minutes {
            return Err(SettingsError::TriggerWindowInverted {
                min: self.left_on_read_trigger_min_minutes,
                max: self.left_on_read_trigger_max_minutes,
            });
        }
        if self.compact_target_percent >= self.compact_threshold_percent {
            return Err(SettingsError::CompactTargetNotBelowThreshold {
                target: self.compact_target_percent,
                threshold: self.compact_threshold_percent,
            });
        }

        let percents = [
            ("proactive_away_chance", self.proactive_away_chance),
            ("proactive_busy_chance", self.proactive_busy_chance),
            ("compact_threshold_percent", self.compact_threshold_percent),
            ("compact_target_percent", self.compact_target_percent),
        ];
        for (field, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(SettingsError::PercentOutOfRange { field });
            }
        }

        let positives = [
            ("daily_proactive_limit", self.daily_proactive_limit),
            ("daily_left_on_read_limit", self.daily_left_on_read_limit),
            (
                "proactive_check_interval_minutes",
                self.proactive_check_interval_minutes,
            ),
            ("max_consecutive_proactive", self.max_consecutive_proactive),
            (
                "left_on_read_character_cooldown_minutes",
                self.left_on_read_character_cooldown_minutes,
            ),
            ("keep_uncompacted_messages", self.keep_uncompacted_messages),
        ];
        for (field, value) in positives {
            if value <= 0 {
                return Err(SettingsError::NotPositive { field });
            }
        }

        if self.proactive_message_hours < 0 {
            return Err(SettingsError::NotPositive {
                field: "proactive_message_hours",
            });
        }
        if self.left_on_read_trigger_min_minutes < 0 {
            return Err(SettingsError::NotPositive {
                field: "left_on_read_trigger_min_minutes",
            });
        }
        if self.proactive_cooldown_multiplier < 1.0 {
            return Err(SettingsError::MultiplierBelowOne);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = BehaviorSettings::default();
        settings.validate().unwrap();

        assert_eq!(settings.daily_proactive_limit, 5);
        assert_eq!(settings.proactive_away_chance, 50.0);
        assert_eq!(settings.max_consecutive_proactive, 4);
        assert_eq!(settings.left_on_read_character_cooldown_minutes, 120);
        assert_eq!(settings.keep_uncompacted_messages, 30);
        assert_eq!(settings.pacing_style, PacingStyle::Balanced);
    }

    #[test]
    fn test_inverted_trigger_window_rejected() {
        let settings = BehaviorSettings {
            left_on_read_trigger_min_minutes: 20,
            left_on_read_trigger_max_minutes: 5,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::TriggerWindowInverted { min: 20, max: 5 })
        );
    }

    #[test]
    fn test_compact_target_must_stay_below_threshold() {
        let settings = BehaviorSettings {
            compact_threshold_percent: 70.0,
            compact_target_percent: 70.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::CompactTargetNotBelowThreshold { .. })
        ));
    }

    #[test]
    fn test_chance_must_be_a_percent() {
        let settings = BehaviorSettings {
            proactive_away_chance: 140.0,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::PercentOutOfRange {
                field: "proactive_away_chance"
            })
        );
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let settings = BehaviorSettings {
            proactive_cooldown_multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::MultiplierBelowOne));
    }

    #[test]
    fn test_pacing_style_roundtrip() {
        assert_eq!("eager".parse::<PacingStyle>(), Ok(PacingStyle::Eager));
        assert_eq!(PacingStyle::Relaxed.as_str(), "relaxed");
        assert!("frantic".parse::<PacingStyle>().is_err());
    }
}
