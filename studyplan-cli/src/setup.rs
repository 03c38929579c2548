use anyhow::Result;
use std::io::{self, Write};
use studyplan_core::StudyStrategy;

use crate::config::{Config, config_path, load_config, save_config_to};

/// Ask for a value, keeping `default` on a blank answer.
fn prompt(label: &str, default: &str) -> Result<String> {
    print!("{} [{}]: ", label, default);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    let s = s.trim();
    Ok(if s.is_empty() { default.to_string() } else { s.to_string() })
}

fn parse_strategy(s: &str) -> Option<StudyStrategy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "fixed" | "fixed-interval" | "pomodoro" => Some(StudyStrategy::FixedInterval),
        "active" | "active-recall" => Some(StudyStrategy::ActiveRecall),
        "spaced" | "spaced-repetition" => Some(StudyStrategy::SpacedRepetition),
        _ => None,
    }
}

fn strategy_name(s: StudyStrategy) -> &'static str {
    match s {
        StudyStrategy::FixedInterval => "fixed-interval",
        StudyStrategy::ActiveRecall => "active-recall",
        StudyStrategy::SpacedRepetition => "spaced-repetition",
    }
}

/// Interactive setup. With `defaults` the prompts are skipped and the
/// built-in configuration is written as-is.
pub fn run_setup(defaults: bool) -> Result<()> {
    let path = config_path()?;
    let mut cfg = if defaults { Config::default() } else { load_config()? };

    if !defaults {
        println!("Studyplan setup (press enter to keep the value in brackets)\n");
        cfg.schedule.timezone = prompt("Timezone (IANA)", &cfg.schedule.timezone)?;
        cfg.schedule.preferred_start = prompt("Preferred study start (HH:MM)", &cfg.schedule.preferred_start)?;
        cfg.schedule.preferred_end = prompt("Preferred study end (HH:MM)", &cfg.schedule.preferred_end)?;
        cfg.routine.study_start = prompt("Home study starts (HH:MM)", &cfg.routine.study_start)?;
        cfg.routine.dinner_time = prompt("Dinner (HH:MM)", &cfg.routine.dinner_time)?;
        cfg.routine.sleep_time = prompt("Bedtime (HH:MM)", &cfg.routine.sleep_time)?;

        let answer = prompt("Strategy (fixed / active / spaced)", strategy_name(cfg.strategy))?;
        match parse_strategy(&answer) {
            Some(s) => cfg.strategy = s,
            None => println!("Unknown strategy {answer:?}; keeping {}", strategy_name(cfg.strategy)),
        }
    }

    // Refuse to write something the planner would reject later.
    cfg.to_preferences()?;
    save_config_to(&cfg, &path)?;

    println!("\nWrote {}", path.display());
    println!("\nNext:");
    println!("- studyplan estimate --title \"Lab report\" --due \"2026-10-23 23:59\"");
    println!("- studyplan plan --assignments assignments.json");
    Ok(())
}
