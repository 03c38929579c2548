use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use studyplan_core::time::parse_time_of_day;
use studyplan_core::{FixedBlock, HomeRoutine, ScheduleSettings, StudyStrategy, UserPreferences};

use crate::state::ensure_studyplan_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scopes cache keys so several people can share one machine.
    pub account: String,
    pub strategy: StudyStrategy,
    pub schedule: ScheduleSection,
    pub routine: RoutineSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub preferred_start: String,
    pub preferred_end: String,
    pub load_bias: f64,
    /// 0 disables the minimum horizon (plan only up to the latest due date).
    pub horizon_days: u32,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineSection {
    pub study_start: String,
    pub sleep_time: String,
    pub dinner_time: String,
    pub dinner_minutes: i64,
    pub fixed_blocks: Vec<FixedBlockSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedBlockSection {
    pub title: String,
    pub start: String,
    pub minutes: i64,
    #[serde(default)]
    pub weekdays: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: "default".to_string(),
            strategy: StudyStrategy::default(),
            schedule: ScheduleSection::default(),
            routine: RoutineSection::default(),
        }
    }
}

impl Default for ScheduleSection {
    fn default() -> Self {
        let s = ScheduleSettings::default();
        Self {
            preferred_start: s.preferred_start.format("%H:%M").to_string(),
            preferred_end: s.preferred_end.format("%H:%M").to_string(),
            load_bias: s.load_bias,
            horizon_days: s.horizon_days.unwrap_or(0),
            timezone: s.timezone.name().to_string(),
        }
    }
}

impl Default for RoutineSection {
    fn default() -> Self {
        let r = HomeRoutine::default();
        Self {
            study_start: r.study_start.format("%H:%M").to_string(),
            sleep_time: r.sleep_time.format("%H:%M").to_string(),
            dinner_time: r.dinner_time.format("%H:%M").to_string(),
            dinner_minutes: r.dinner_minutes,
            fixed_blocks: Vec::new(),
        }
    }
}

impl Config {
    /// Validate and convert into the snapshot the core consumes.
    pub fn to_preferences(&self) -> Result<UserPreferences> {
        let timezone = self
            .schedule
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {:?}: {e}", self.schedule.timezone))?;

        let schedule = ScheduleSettings::new(
            parse_time_of_day(&self.schedule.preferred_start).context("schedule.preferred_start")?,
            parse_time_of_day(&self.schedule.preferred_end).context("schedule.preferred_end")?,
            timezone,
        )
        .with_load_bias(self.schedule.load_bias)
        .with_horizon((self.schedule.horizon_days > 0).then_some(self.schedule.horizon_days));
        schedule.validate()?;

        if self.routine.dinner_minutes < 0 {
            bail!("routine.dinner_minutes must not be negative");
        }
        let fixed_blocks = self
            .routine
            .fixed_blocks
            .iter()
            .map(|b| {
                if b.minutes <= 0 {
                    bail!("fixed block {:?} must last at least one minute", b.title);
                }
                if let Some(d) = b.weekdays.iter().find(|d| **d > 6) {
                    bail!("fixed block {:?} has weekday {d}; use 0=Mon .. 6=Sun", b.title);
                }
                Ok(FixedBlock {
                    title: b.title.clone(),
                    start: parse_time_of_day(&b.start).with_context(|| format!("fixed block {:?}", b.title))?,
                    minutes: b.minutes,
                    weekdays: b.weekdays.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let routine = HomeRoutine {
            study_start: parse_time_of_day(&self.routine.study_start).context("routine.study_start")?,
            sleep_time: parse_time_of_day(&self.routine.sleep_time).context("routine.sleep_time")?,
            dinner_time: parse_time_of_day(&self.routine.dinner_time).context("routine.dinner_time")?,
            dinner_minutes: self.routine.dinner_minutes,
            fixed_blocks,
        };

        Ok(UserPreferences {
            schedule,
            routine,
            strategy: self.strategy,
        })
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_studyplan_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config_to(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}
