//! Chunked-session generator: a week of typed items (meals, breaks, study,
//! custom commitments) built by walking each day's free window sequentially.
//!
//! Unlike the tiered allocator this never looks ahead: it takes one
//! strategy-sized chunk of the most pressing assignment, inserts a break, and
//! repeats until the day runs out. Whatever does not fit in the week is dropped.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::Assignment;
use crate::estimator::{estimate, priority};
use crate::settings::{StudyStrategy, UserPreferences};
use crate::time::local_instant;

pub const WEEK_DAYS: u64 = 7;
/// Below this many free minutes a day is considered full.
pub const MIN_SLOT_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Meal,
    Break,
    Study,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub assignment_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleItem {
    fn new(kind: ItemKind, title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            assignment_id: None,
            start,
            end,
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// (chunk minutes, break minutes) for the next slice of an assignment.
fn chunk_for(strategy: StudyStrategy, remaining: i64, pending_review: bool) -> (i64, i64) {
    match strategy {
        StudyStrategy::FixedInterval => (25, 5),
        StudyStrategy::ActiveRecall => (if remaining > 60 { 40 } else { 30 }, 10),
        StudyStrategy::SpacedRepetition => (if pending_review { 20 } else { 50 }, 7),
    }
}

fn break_title(strategy: StudyStrategy) -> &'static str {
    match strategy {
        StudyStrategy::FixedInterval => "Short break",
        StudyStrategy::ActiveRecall => "Reflection break",
        StudyStrategy::SpacedRepetition => "Break",
    }
}

#[derive(Debug)]
struct Pending<'a> {
    assignment: &'a Assignment,
    deadline: Option<DateTime<Utc>>,
    priority: i32,
    minutes: i32,
    remaining: i64,
    last_studied: Option<NaiveDate>,
}

/// Round up to the next 15-minute boundary.
fn ceil_to_quarter_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    let floored = dt
        .with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt);
    let floored = floored - Duration::minutes(i64::from(floored.minute() % 15));
    if floored == dt { dt } else { floored + Duration::minutes(15) }
}

/// Dinner plus the fixed blocks that apply on `day`.
fn fixed_items(prefs: &UserPreferences, day: NaiveDate) -> Vec<ScheduleItem> {
    let tz = prefs.schedule.timezone;
    let routine = &prefs.routine;
    let weekday = day.weekday().num_days_from_monday() as u8;

    let dinner_start = local_instant(tz, day, routine.dinner_time);
    let mut out = vec![ScheduleItem::new(
        ItemKind::Meal,
        "Dinner",
        dinner_start,
        dinner_start + Duration::minutes(routine.dinner_minutes),
    )];
    for block in routine.fixed_blocks.iter().filter(|b| b.applies_on(weekday)) {
        let start = local_instant(tz, day, block.start);
        out.push(ScheduleItem::new(
            ItemKind::Custom,
            block.title.clone(),
            start,
            start + Duration::minutes(block.minutes),
        ));
    }
    out.retain(|i| i.end > i.start);
    out
}

/// Build seven days of study sessions starting at `start_date`.
pub fn generate_week(
    prefs: &UserPreferences,
    assignments: &[Assignment],
    start_date: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<ScheduleItem> {
    let tz = prefs.schedule.timezone;
    let routine = &prefs.routine;
    let strategy = prefs.strategy;

    let mut pending: Vec<Pending> = assignments
        .iter()
        .filter(|a| !a.completed)
        .map(|a| {
            let est = estimate(a, prefs, now);
            Pending {
                assignment: a,
                deadline: a.has_real_due_date.then_some(a.due_date),
                priority: priority(a, est.minutes, now),
                minutes: est.minutes,
                remaining: i64::from(est.minutes - a.minutes_completed.max(0)).max(0),
                last_studied: None,
            }
        })
        .collect();
    pending.sort_by(|a, b| {
        a.assignment
            .due_date
            .cmp(&b.assignment.due_date)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| b.minutes.cmp(&a.minutes))
            .then_with(|| a.assignment.id.cmp(&b.assignment.id))
    });

    let days: Vec<NaiveDate> = start_date.iter_days().take(WEEK_DAYS as usize).collect();
    let mut items: Vec<ScheduleItem> = days.iter().flat_map(|d| fixed_items(prefs, *d)).collect();
    items.retain(|i| i.end > now);
    // Not emitted, but a window past midnight on the last day still runs into them.
    let trailing: Vec<ScheduleItem> = days
        .last()
        .and_then(|d| d.succ_opt())
        .map(|d| fixed_items(prefs, d))
        .unwrap_or_default();

    for day in days {
        let window_start = ceil_to_quarter_hour(local_instant(tz, day, routine.study_start).max(now));
        let window_end = if routine.sleep_time > routine.study_start {
            local_instant(tz, day, routine.sleep_time)
        } else {
            local_instant(tz, day + Duration::days(1), routine.sleep_time)
        };

        let mut cursor = window_start;
        loop {
            if window_end - cursor < Duration::minutes(MIN_SLOT_MINUTES) {
                break;
            }
            let Some(p) = pending.iter_mut().find(|p| {
                p.remaining > 0
                    && p
                        .deadline
                        .is_none_or(|d| d - cursor >= Duration::minutes(MIN_SLOT_MINUTES))
            }) else {
                break;
            };

            let review = p.last_studied.is_some_and(|d| d < day);
            let (chunk, brk) = chunk_for(strategy, p.remaining, review);
            let mut end = (cursor + Duration::minutes(chunk.min(p.remaining))).min(window_end);
            if let Some(deadline) = p.deadline {
                end = end.min(deadline);
            }

            if let Some(blocker) = items
                .iter()
                .chain(&trailing)
                .filter(|i| i.overlaps(cursor, end))
                .min_by_key(|i| i.start)
            {
                cursor = cursor.max(blocker.end);
                continue;
            }

            let minutes = (end - cursor).num_minutes();
            let mut study = ScheduleItem::new(ItemKind::Study, p.assignment.title.clone(), cursor, end);
            study.assignment_id = Some(p.assignment.id.clone());
            items.push(study);
            p.remaining -= minutes;
            p.last_studied = Some(day);
            cursor = end;

            if pending.iter().all(|p| p.remaining <= 0) {
                break;
            }
            let break_end = (cursor + Duration::minutes(brk)).min(window_end);
            if break_end > cursor && !items.iter().chain(&trailing).any(|i| i.overlaps(cursor, break_end)) {
                items.push(ScheduleItem::new(ItemKind::Break, break_title(strategy), cursor, break_end));
                cursor = break_end;
            }
        }
    }

    items.sort_by_key(|i| i.start);
    items
}
