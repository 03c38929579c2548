//! Effort estimator: assignment text + metadata -> minutes and importance.
//!
//! Deterministic keyword heuristics, no model calls. Keywords match whole-word
//! prefixes so "essays" counts as an essay but "syllabus" is not a lab.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::assignment::Assignment;
use crate::settings::UserPreferences;

pub const MIN_MINUTES: i32 = 20;
pub const MAX_MINUTES: i32 = 240;
/// Ceiling for open-ended study material without a real deadline.
pub const UNDATED_MAX_MINUTES: i32 = 90;

const BASE_MINUTES: i32 = 45;
const STUDY_BASE_MINUTES: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub minutes: i32,
    /// 1-5.
    pub importance: i32,
}

struct KeywordSet {
    re: Regex,
    weights: &'static [(&'static str, i32)],
}

impl KeywordSet {
    fn new(weights: &'static [(&'static str, i32)]) -> Self {
        let alternatives: Vec<String> = weights
            .iter()
            .map(|(k, _)| regex::escape(k).replace(' ', r"\s+"))
            .collect();
        let pattern = format!(r"\b({})", alternatives.join("|"));
        Self {
            re: Regex::new(&pattern).expect("keyword pattern is built from escaped literals"),
            weights,
        }
    }

    /// Largest weight among matched keywords.
    fn best_match(&self, text: &str) -> Option<i32> {
        self.re
            .find_iter(text)
            .filter_map(|m| {
                let hit = normalize_ws(m.as_str());
                self.weights
                    .iter()
                    .find(|(k, _)| *k == hit)
                    .map(|(_, w)| *w)
            })
            .max()
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

static STUDY: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(&[
        ("study", 0),
        ("review", 0),
        ("notes", 0),
        ("flashcard", 0),
        ("practice", 0),
        ("prepare", 0),
    ])
});

static HIGH_EFFORT: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(&[
        ("essay", 90),
        ("paper", 90),
        ("project", 120),
        ("research", 90),
        ("lab", 60),
        ("report", 60),
        ("presentation", 60),
    ])
});

static MEDIUM_EFFORT: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(&[
        ("worksheet", 20),
        ("quiz", 15),
        ("reading", 25),
        ("homework", 20),
        ("problem set", 30),
        ("discussion", 15),
    ])
});

/// Estimate effort and importance for one assignment.
///
/// `_prefs` is threaded through for per-user calibration; the heuristic does not
/// read it yet. Upstream `ai_*` values, when present, win over the heuristic.
pub fn estimate(assignment: &Assignment, _prefs: &UserPreferences, now: DateTime<Utc>) -> Estimate {
    let text = format!("{} {}", assignment.title, assignment.description).to_lowercase();
    let days = days_to_due(assignment, now);

    let is_study = STUDY.best_match(&text).is_some();
    let high = HIGH_EFFORT.best_match(&text);
    let medium = MEDIUM_EFFORT.best_match(&text);

    let mut minutes = if is_study && high.is_none() {
        STUDY_BASE_MINUTES
    } else {
        BASE_MINUTES
    };
    minutes += high.unwrap_or(0);
    minutes += medium.unwrap_or(0);

    let desc_len = assignment.description.chars().count() as i32;
    minutes += ((desc_len / 100) * 5).min(30);

    if let Some(d) = days {
        minutes += match d {
            d if d <= 1 => 15,
            d if d <= 3 => 10,
            d if d <= 7 => 5,
            _ => 0,
        };
    } else {
        minutes = minutes.min(UNDATED_MAX_MINUTES);
    }

    let mut importance = 3;
    if high.is_some() {
        importance += 1;
    }
    if days.is_some_and(|d| d <= 2) {
        importance += 1;
    }
    if days.is_none() && is_study {
        importance -= 1;
    }

    let minutes = assignment.ai_estimated_minutes.unwrap_or(minutes);
    let importance = assignment.ai_importance.unwrap_or(importance);

    Estimate {
        minutes: round_to_five(minutes.clamp(MIN_MINUTES, MAX_MINUTES)),
        importance: importance.clamp(1, 5),
    }
}

/// Urgency bucket: 1 = most urgent, 3 = least.
pub fn priority(assignment: &Assignment, estimated_minutes: i32, now: DateTime<Utc>) -> i32 {
    let Some(days) = days_to_due(assignment, now) else {
        return 3;
    };

    if days <= 1 || (days <= 3 && estimated_minutes >= 120) {
        1
    } else if days <= 7 || estimated_minutes >= 180 {
        2
    } else {
        3
    }
}

/// Whole days until due (negative when overdue), or None for undated material.
fn days_to_due(assignment: &Assignment, now: DateTime<Utc>) -> Option<i64> {
    if !assignment.has_real_due_date {
        return None;
    }
    Some((assignment.due_date - now).num_hours().div_euclid(24))
}

fn round_to_five(minutes: i32) -> i32 {
    ((minutes + 2) / 5) * 5
}
