//! Assignment model: the rich record the sync layer owns, and the narrow
//! projection the scheduler consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::estimator::{Estimate, estimate};
use crate::settings::UserPreferences;

/// Assignment as delivered by the assignment store.
///
/// Read-only to the scheduling core. `due_date` is always populated; when
/// `has_real_due_date` is false it is a synthetic target for open-ended study
/// material rather than a hard deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,

    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_true")]
    pub has_real_due_date: bool,

    /// Course/classroom the assignment belongs to.
    #[serde(default)]
    pub course_id: Option<String>,

    /// Minutes, when an upstream estimate exists.
    #[serde(default)]
    pub ai_estimated_minutes: Option<i32>,
    /// 1-5, when an upstream estimate exists.
    #[serde(default)]
    pub ai_importance: Option<i32>,

    #[serde(default)]
    pub minutes_completed: i32,
}

fn default_true() -> bool {
    true
}

impl Assignment {
    pub fn new(id: impl Into<String>, title: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            due_date,
            completed: false,
            has_real_due_date: true,
            course_id: None,
            ai_estimated_minutes: None,
            ai_importance: None,
            minutes_completed: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    /// Mark as open-ended study material (the due date is only a target).
    pub fn undated(mut self) -> Self {
        self.has_real_due_date = false;
        self
    }

    pub fn with_minutes_completed(mut self, minutes: i32) -> Self {
        self.minutes_completed = minutes;
        self
    }

    pub fn with_ai_estimate(mut self, minutes: i32, importance: i32) -> Self {
        self.ai_estimated_minutes = Some(minutes);
        self.ai_importance = Some(importance);
        self
    }

    pub fn mark_completed(mut self) -> Self {
        self.completed = true;
        self
    }
}

/// Scheduling-facing projection of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentInput {
    pub id: String,
    pub due_date: DateTime<Utc>,
    pub total_hours: f64,
    pub hours_completed: f64,
    pub importance: f64,
}

impl AssignmentInput {
    pub fn new(id: impl Into<String>, due_date: DateTime<Utc>, total_hours: f64) -> Self {
        Self {
            id: id.into(),
            due_date,
            total_hours,
            hours_completed: 0.0,
            importance: 3.0,
        }
    }

    pub fn with_completed(mut self, hours: f64) -> Self {
        self.hours_completed = hours;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Build the projection from a record and its effort estimate.
    pub fn from_assignment(assignment: &Assignment, estimate: Estimate) -> Self {
        Self {
            id: assignment.id.clone(),
            due_date: assignment.due_date,
            total_hours: f64::from(estimate.minutes) / 60.0,
            hours_completed: f64::from(assignment.minutes_completed.max(0)) / 60.0,
            importance: f64::from(estimate.importance),
        }
    }

    /// Remaining effort, clamped at zero.
    pub fn remaining_hours(&self) -> f64 {
        (self.total_hours - self.hours_completed).max(0.0)
    }

    /// Remaining effort in whole seconds.
    pub fn remaining_seconds(&self) -> i64 {
        (self.remaining_hours() * 3600.0).round() as i64
    }
}

/// Project every open assignment through the estimator. Completed records
/// are dropped.
pub fn inputs_from_assignments(
    assignments: &[Assignment],
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Vec<AssignmentInput> {
    assignments
        .iter()
        .filter(|a| !a.completed)
        .map(|a| AssignmentInput::from_assignment(a, estimate(a, prefs, now)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_remaining_is_clamped_at_zero() {
        let due = Utc.with_ymd_and_hms(2026, 10, 20, 12, 0, 0).unwrap();
        let a = AssignmentInput::new("a", due, 1.0).with_completed(1.5);
        assert_eq!(a.remaining_hours(), 0.0);
        assert_eq!(a.remaining_seconds(), 0);
    }

    #[test]
    fn test_projection_uses_estimate_and_progress() {
        let due = Utc.with_ymd_and_hms(2026, 10, 20, 12, 0, 0).unwrap();
        let a = Assignment::new("hw1", "Worksheet 3", due).with_minutes_completed(30);
        let input = AssignmentInput::from_assignment(
            &a,
            Estimate {
                minutes: 90,
                importance: 4,
            },
        );
        assert_eq!(input.total_hours, 1.5);
        assert_eq!(input.hours_completed, 0.5);
        assert_eq!(input.importance, 4.0);
        assert_eq!(input.remaining_seconds(), 3600);
    }

    #[test]
    fn test_completed_records_are_not_projected() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let due = Utc.with_ymd_and_hms(2026, 10, 24, 12, 0, 0).unwrap();
        let records = vec![
            Assignment::new("open", "Essay draft", due).with_ai_estimate(120, 4),
            Assignment::new("done", "Quiz", due).mark_completed(),
        ];
        let inputs = inputs_from_assignments(&records, &UserPreferences::default(), now);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id, "open");
        assert_eq!(inputs[0].total_hours, 2.0);
        assert_eq!(inputs[0].importance, 4.0);
    }

    #[test]
    fn test_assignment_json_defaults() {
        let a: Assignment = serde_json::from_str(
            r#"{"id":"x","title":"Read ch. 4","due_date":"2026-10-21T17:00:00Z"}"#,
        )
        .unwrap();
        assert!(a.has_real_due_date);
        assert!(!a.completed);
        assert_eq!(a.minutes_completed, 0);
    }
}
