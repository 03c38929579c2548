//! Schedule generator: window builder + allocator across the planning horizon,
//! grouped into one `PlannedDay` per calendar day.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocator::{Allocation, allocate, deadline_order, unallocated_seconds};
use crate::assignment::AssignmentInput;
use crate::settings::{MAX_HORIZON_DAYS, ScheduleSettings};
use crate::time::{days_inclusive, local_date, start_of_day};
use crate::window::{AllocationWindow, WindowTier, windows_for};

/// A committed block of work for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAssignmentBlock {
    pub id: String,
    pub assignment_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub preferred_hours: f64,
    pub overflow_hours: f64,
    /// Reserved; always zero.
    pub buffer_remaining: f64,
    pub overflow_reason: Option<String>,
}

impl DailyAssignmentBlock {
    fn from_allocation(a: &Allocation) -> Self {
        let hours = a.duration_seconds() as f64 / 3600.0;
        let (preferred_hours, overflow_hours) = if a.is_overflow { (0.0, hours) } else { (hours, 0.0) };
        let overflow_reason = match a.tier {
            WindowTier::Preferred => None,
            WindowTier::Overflow => Some("preferred window full".to_string()),
            WindowTier::Early => Some("preferred and evening time full".to_string()),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id: a.assignment_id.clone(),
            start: a.start,
            end: a.end,
            preferred_hours,
            overflow_hours,
            buffer_remaining: 0.0,
            overflow_reason,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }
}

/// One calendar day of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedDay {
    pub date: NaiveDate,
    pub blocks: Vec<DailyAssignmentBlock>,
    /// remaining hours / max(1, hours until due), per assignment.
    pub urgency: BTreeMap<String, f64>,
    /// False when an assignment still open on this day could not be fully packed.
    pub all_on_track: bool,
}

impl PlannedDay {
    pub fn total_hours(&self) -> f64 {
        self.blocks.iter().map(DailyAssignmentBlock::duration_hours).sum()
    }
}

/// Generate the tiered plan for `assignments` as seen from `now`.
///
/// Returns one entry per day from today through the horizon end, including
/// empty days. An empty assignment list yields an empty plan.
pub fn generate_schedule(
    assignments: &[AssignmentInput],
    settings: &ScheduleSettings,
    now: DateTime<Utc>,
) -> Vec<PlannedDay> {
    let Some(latest_due) = assignments.iter().map(|a| a.due_date).max() else {
        return Vec::new();
    };
    let tz = settings.timezone;

    let mut ordered: Vec<AssignmentInput> = assignments.to_vec();
    ordered.sort_by(deadline_order);

    let today = local_date(tz, now);
    let due_end = local_date(tz, latest_due);
    let horizon_end = match settings.horizon_days {
        Some(days) => {
            // Unvalidated settings may carry any u32.
            let days = days.clamp(1, MAX_HORIZON_DAYS);
            let min_end = today
                .checked_add_days(Days::new(u64::from(days) - 1))
                .unwrap_or(NaiveDate::MAX);
            min_end.max(due_end)
        }
        None => due_end,
    };
    let planning_days = days_inclusive(today, horizon_end);

    let windows: HashMap<String, Vec<AllocationWindow>> = ordered
        .iter()
        .map(|a| {
            let w = windows_for(
                a,
                &planning_days,
                settings.preferred_start,
                settings.preferred_end,
                now,
                tz,
            );
            (a.id.clone(), w)
        })
        .collect();

    // TODO: let load_bias choose between evening overflow and early-morning
    // time once there is a user-facing control for it.
    let allocations = allocate(&ordered, &windows);
    let shortfall = unallocated_seconds(&ordered, &allocations);

    let mut by_day: BTreeMap<NaiveDate, Vec<DailyAssignmentBlock>> = BTreeMap::new();
    for a in &allocations {
        by_day
            .entry(local_date(tz, a.start))
            .or_default()
            .push(DailyAssignmentBlock::from_allocation(a));
    }

    debug!(
        target: "studyplan::schedule",
        assignments = ordered.len(),
        days = planning_days.len(),
        blocks = allocations.len(),
        short = shortfall.len(),
        "generated schedule"
    );

    planning_days
        .into_iter()
        .map(|date| {
            let day_start = start_of_day(tz, date);
            let reference = day_start.max(now);

            let urgency = ordered
                .iter()
                .map(|a| (a.id.clone(), urgency(a, reference)))
                .collect();

            let all_on_track = !ordered
                .iter()
                .any(|a| a.due_date > day_start && shortfall.contains_key(&a.id));

            let mut blocks = by_day.remove(&date).unwrap_or_default();
            blocks.sort_by_key(|b| b.start);

            PlannedDay {
                date,
                blocks,
                urgency,
                all_on_track,
            }
        })
        .collect()
}

/// Convenience wrapper using the wall clock.
pub fn generate_schedule_now(assignments: &[AssignmentInput], settings: &ScheduleSettings) -> Vec<PlannedDay> {
    generate_schedule(assignments, settings, Utc::now())
}

fn urgency(a: &AssignmentInput, reference: DateTime<Utc>) -> f64 {
    let hours_until_due = (a.due_date - reference).num_seconds() as f64 / 3600.0;
    a.remaining_hours() / hours_until_due.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};

    fn settings() -> ScheduleSettings {
        ScheduleSettings::new(
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            chrono_tz::UTC,
        )
        .with_horizon(Some(3))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_input_is_empty_plan() {
        assert!(generate_schedule(&[], &settings(), now()).is_empty());
    }

    #[test]
    fn test_horizon_covers_min_length_and_latest_due() {
        let short = AssignmentInput::new("a", now() + Duration::hours(5), 1.0);
        let plan = generate_schedule(&[short.clone()], &settings(), now());
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        let long = AssignmentInput::new("b", now() + Duration::days(9), 1.0);
        let plan = generate_schedule(&[short.clone(), long], &settings(), now());
        assert_eq!(plan.len(), 10);

        let plan = generate_schedule(&[short], &settings().with_horizon(None), now());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_oversized_horizon_is_capped() {
        let a = AssignmentInput::new("a", now() + Duration::days(2), 1.0);
        let plan = generate_schedule(&[a.clone()], &settings().with_horizon(Some(u32::MAX)), now());
        assert_eq!(plan.len(), MAX_HORIZON_DAYS as usize);
        assert_eq!(plan[0].date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        let plan = generate_schedule(&[a], &settings().with_horizon(Some(MAX_HORIZON_DAYS + 1)), now());
        assert_eq!(plan.len(), MAX_HORIZON_DAYS as usize);
    }

    #[test]
    fn test_urgency_attached_to_every_day() {
        let a = AssignmentInput::new("a", now() + Duration::days(2), 4.0);
        let plan = generate_schedule(&[a], &settings(), now());
        assert!(plan.iter().all(|d| d.urgency.contains_key("a")));
        // 4h remaining / 48h until due.
        assert!((plan[0].urgency["a"] - 4.0 / 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_urgency_divisor_floors_at_one_hour() {
        let a = AssignmentInput::new("a", now() + Duration::minutes(10), 2.0);
        let plan = generate_schedule(&[a], &settings(), now());
        assert!((plan[0].urgency["a"] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_blocks_split_hours_and_explain() {
        let a = AssignmentInput::new("a", Utc.with_ymd_and_hms(2026, 10, 19, 23, 0, 0).unwrap(), 2.0);
        let plan = generate_schedule(&[a], &settings(), now());
        let blocks = &plan[0].blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].preferred_hours, 1.0);
        assert_eq!(blocks[0].overflow_reason, None);
        assert_eq!(blocks[1].overflow_hours, 1.0);
        assert!(blocks[1].overflow_reason.is_some());
        assert!(blocks.iter().all(|b| b.buffer_remaining == 0.0));
    }

    #[test]
    fn test_all_on_track_reflects_shortfall() {
        let tight = AssignmentInput::new("tight", now() + Duration::hours(1), 3.0);
        let plan = generate_schedule(&[tight], &settings(), now());
        assert!(!plan[0].all_on_track);
        // Days after the deadline no longer count it.
        assert!(plan[1].all_on_track);

        let easy = AssignmentInput::new("easy", now() + Duration::days(2), 1.0);
        let plan = generate_schedule(&[easy], &settings(), now());
        assert!(plan.iter().all(|d| d.all_on_track));
    }
}
