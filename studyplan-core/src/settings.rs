//! Immutable snapshots of the user's time preferences.
//!
//! Every generation call takes one of these by reference; the regeneration
//! controller diffs snapshots instead of observing a shared mutable object.

use anyhow::{Result, bail};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Longest minimum horizon a configuration may ask for.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Inputs to the tiered allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub preferred_start: NaiveTime,
    pub preferred_end: NaiveTime,
    /// Carried and hashed; does not yet influence allocation.
    pub load_bias: f64,
    /// Minimum number of days to plan, counting today.
    pub horizon_days: Option<u32>,
    pub timezone: Tz,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            preferred_start: hm(17, 0),
            preferred_end: hm(18, 0),
            load_bias: 0.5,
            horizon_days: Some(14),
            timezone: chrono_tz::America::Chicago,
        }
    }
}

impl ScheduleSettings {
    pub fn new(preferred_start: NaiveTime, preferred_end: NaiveTime, timezone: Tz) -> Self {
        Self {
            preferred_start,
            preferred_end,
            timezone,
            ..Self::default()
        }
    }

    pub fn with_horizon(mut self, days: Option<u32>) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn with_load_bias(mut self, load_bias: f64) -> Self {
        self.load_bias = load_bias;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.preferred_end <= self.preferred_start {
            bail!(
                "preferred window must end after it starts ({} - {})",
                self.preferred_start.format("%H:%M"),
                self.preferred_end.format("%H:%M")
            );
        }
        if !self.load_bias.is_finite() {
            bail!("load_bias must be a finite number");
        }
        if self.horizon_days == Some(0) {
            bail!("horizon_days must be at least 1 when set");
        }
        if let Some(days) = self.horizon_days.filter(|d| *d > MAX_HORIZON_DAYS) {
            bail!("horizon_days must be at most {MAX_HORIZON_DAYS}, got {days}");
        }
        Ok(())
    }
}

/// Session strategy for the chunked generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudyStrategy {
    /// 25/5 pomodoro-style intervals.
    #[default]
    FixedInterval,
    ActiveRecall,
    SpacedRepetition,
}

/// A recurring personal commitment placed before study chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedBlock {
    pub title: String,
    pub start: NaiveTime,
    pub minutes: i64,
    /// 0=Mon ... 6=Sun. Empty means every day.
    #[serde(default)]
    pub weekdays: Vec<u8>,
}

impl FixedBlock {
    pub fn applies_on(&self, weekday: u8) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&weekday)
    }
}

/// Home routine used only by the chunked-session generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeRoutine {
    pub study_start: NaiveTime,
    pub sleep_time: NaiveTime,
    pub dinner_time: NaiveTime,
    pub dinner_minutes: i64,
    #[serde(default)]
    pub fixed_blocks: Vec<FixedBlock>,
}

impl Default for HomeRoutine {
    fn default() -> Self {
        Self {
            study_start: hm(16, 0),
            sleep_time: hm(23, 0),
            dinner_time: hm(19, 0),
            dinner_minutes: 45,
            fixed_blocks: Vec::new(),
        }
    }
}

/// Full preference snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub schedule: ScheduleSettings,
    pub routine: HomeRoutine,
    pub strategy: StudyStrategy,
}

impl UserPreferences {
    pub fn with_strategy(mut self, strategy: StudyStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ScheduleSettings::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let s = ScheduleSettings::new(hm(18, 0), hm(17, 0), chrono_tz::UTC);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_zero_horizon_is_rejected() {
        let s = ScheduleSettings::default().with_horizon(Some(0));
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_horizon_above_one_year_is_rejected() {
        let s = ScheduleSettings::default().with_horizon(Some(MAX_HORIZON_DAYS));
        assert!(s.validate().is_ok());
        let s = ScheduleSettings::default().with_horizon(Some(MAX_HORIZON_DAYS + 1));
        assert!(s.validate().is_err());
        let s = ScheduleSettings::default().with_horizon(Some(u32::MAX));
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_strategy_serializes_kebab_case() {
        let s = serde_json::to_string(&StudyStrategy::SpacedRepetition).unwrap();
        assert_eq!(s, "\"spaced-repetition\"");
    }

    #[test]
    fn test_fixed_block_weekday_filter() {
        let b = FixedBlock {
            title: "Soccer".into(),
            start: hm(17, 0),
            minutes: 90,
            weekdays: vec![1, 3],
        };
        assert!(b.applies_on(1));
        assert!(!b.applies_on(2));
    }
}
