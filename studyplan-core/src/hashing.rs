//! Content hashes for change detection.
//!
//! djb2 over a canonical text rendering. Numbers are rounded to two decimals
//! and instants truncated to the minute before hashing, so float jitter and
//! sub-minute noise never count as a change.

use crate::assignment::AssignmentInput;
use crate::settings::ScheduleSettings;
use crate::time::seconds_from_midnight;

/// djb2: `h = h * 33 + byte`, seeded with 5381, wrapping.
pub fn djb2(input: &str) -> u64 {
    input
        .bytes()
        .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(u64::from(b)))
}

/// Canonical line for one assignment: `id|due-to-minute|total|completed`.
pub fn assignment_fingerprint(a: &AssignmentInput) -> String {
    format!(
        "{}|{}|{:.2}|{:.2}",
        a.id,
        a.due_date.format("%Y-%m-%dT%H:%M"),
        a.total_hours,
        a.hours_completed
    )
}

/// Canonical text for an assignment set (order-independent).
pub fn canonical_assignments(assignments: &[AssignmentInput]) -> String {
    let mut sorted: Vec<&AssignmentInput> = assignments.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
        .into_iter()
        .map(assignment_fingerprint)
        .collect::<Vec<_>>()
        .join(";")
}

pub fn assignments_hash(assignments: &[AssignmentInput]) -> u64 {
    djb2(&canonical_assignments(assignments))
}

/// Canonical text for settings: `startSecs|endSecs|bias|horizon|tz`.
pub fn canonical_settings(settings: &ScheduleSettings) -> String {
    let horizon = settings
        .horizon_days
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}|{}|{:.2}|{}|{}",
        seconds_from_midnight(settings.preferred_start),
        seconds_from_midnight(settings.preferred_end),
        settings.load_bias,
        horizon,
        settings.timezone.name()
    )
}

pub fn settings_hash(settings: &ScheduleSettings) -> u64 {
    djb2(&canonical_settings(settings))
}
