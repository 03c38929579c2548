//! Window builder: candidate study intervals for one assignment per planning day.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::assignment::AssignmentInput;
use crate::time::{end_of_day, local_date, local_instant, start_of_day};

/// Which slice of the day a window covers, in fill order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowTier {
    /// The user's configured study window.
    Preferred,
    /// From the end of the preferred window to midnight.
    Overflow,
    /// From midnight to the start of the preferred window.
    Early,
}

impl WindowTier {
    pub const FILL_ORDER: [WindowTier; 3] = [WindowTier::Preferred, WindowTier::Overflow, WindowTier::Early];

    pub fn is_overflow(self) -> bool {
        self != WindowTier::Preferred
    }
}

/// One candidate interval for one assignment on one day. Always `end > start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationWindow {
    pub assignment_id: String,
    pub day: NaiveDate,
    pub tier: WindowTier,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AllocationWindow {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Build preferred/overflow/early windows for `assignment` on each planning day
/// up to and including its due day.
///
/// Windows are right-truncated to the due instant and left-clipped to `now`;
/// anything left with non-positive length is dropped.
pub fn windows_for(
    assignment: &AssignmentInput,
    planning_days: &[NaiveDate],
    preferred_start: NaiveTime,
    preferred_end: NaiveTime,
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<AllocationWindow> {
    let due_day = local_date(tz, assignment.due_date);
    let mut out = Vec::new();

    for &day in planning_days.iter().filter(|d| **d <= due_day) {
        let day_start = start_of_day(tz, day);
        let day_end = end_of_day(tz, day);
        let pref_start = local_instant(tz, day, preferred_start);
        // An inverted window collapses to empty; overflow then begins at the
        // configured start so tiers stay disjoint.
        let pref_end = if preferred_end > preferred_start {
            local_instant(tz, day, preferred_end)
        } else {
            pref_start
        };

        let candidates = [
            (WindowTier::Preferred, pref_start, pref_end),
            (WindowTier::Overflow, pref_end, day_end),
            (WindowTier::Early, day_start, pref_start),
        ];

        for (tier, start, end) in candidates {
            let start = start.max(now);
            let end = end.min(assignment.due_date);
            if end <= start {
                continue;
            }
            out.push(AllocationWindow {
                assignment_id: assignment.id.clone(),
                day,
                tier,
                start,
                end,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn test_three_tiers_per_full_day() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let a = AssignmentInput::new("a", Utc.with_ymd_and_hms(2026, 10, 25, 0, 0, 0).unwrap(), 1.0);
        let w = windows_for(&a, &[day(20)], t(17, 0), t(18, 0), now, tz);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0].tier, WindowTier::Preferred);
        assert_eq!(w[0].duration_seconds(), 3600);
        assert_eq!(w[1].tier, WindowTier::Overflow);
        assert_eq!(w[1].duration_seconds(), 6 * 3600);
        assert_eq!(w[2].tier, WindowTier::Early);
        assert_eq!(w[2].duration_seconds(), 17 * 3600);
    }

    #[test]
    fn test_clipped_to_now_and_due() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 17, 30, 0).unwrap();
        let due = now + Duration::minutes(90);
        let a = AssignmentInput::new("a", due, 1.0);
        let w = windows_for(&a, &[day(19), day(20)], t(17, 0), t(18, 0), now, tz);

        // Preferred 17:30-18:00, overflow 18:00-19:00, early fully in the past.
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].start, now);
        assert_eq!(w[0].duration_seconds(), 30 * 60);
        assert_eq!(w[1].end, due);
        assert!(w.iter().all(|x| x.day == day(19)));
    }

    #[test]
    fn test_days_after_due_are_skipped() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let a = AssignmentInput::new("a", Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap(), 1.0);
        let w = windows_for(&a, &[day(19), day(20), day(21)], t(17, 0), t(18, 0), now, tz);
        assert!(w.iter().all(|x| x.day <= day(20)));
        // Due day only keeps the early window (00:00-09:00).
        let due_day: Vec<_> = w.iter().filter(|x| x.day == day(20)).collect();
        assert_eq!(due_day.len(), 1);
        assert_eq!(due_day[0].tier, WindowTier::Early);
    }

    #[test]
    fn test_inverted_preferred_window_keeps_tiers_disjoint() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let a = AssignmentInput::new("a", Utc.with_ymd_and_hms(2026, 10, 25, 0, 0, 0).unwrap(), 1.0);
        let w = windows_for(&a, &[day(20)], t(18, 0), t(17, 0), now, tz);
        assert!(w.iter().all(|x| x.tier != WindowTier::Preferred));
        let total: i64 = w.iter().map(|x| x.duration_seconds()).sum();
        assert_eq!(total, 24 * 3600);
    }
}
