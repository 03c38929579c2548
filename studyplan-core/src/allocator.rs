//! Allocator: horizon-wide greedy packer over pre-computed windows.
//!
//! Assignments claim time one after another (earliest due first, then most
//! important). Each one exhausts its preferred windows before touching overflow,
//! and overflow before early. There is no rebalancing pass: once an interval is
//! claimed it stays claimed, even if a later-due assignment had to take the
//! preferred slot on an earlier day.
//!
//! Packing is best-effort. Effort that does not fit before the deadline is left
//! unallocated without error; see [`unallocated_seconds`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::AssignmentInput;
use crate::window::{AllocationWindow, WindowTier};

/// One committed carve-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub assignment_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tier: WindowTier,
    pub is_overflow: bool,
}

impl Allocation {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Sorted, non-overlapping claimed intervals per calendar day.
#[derive(Debug, Default, Clone)]
pub struct OccupancyMap {
    days: BTreeMap<NaiveDate, Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-intervals of `[start, end)` not yet claimed on `day`, in time order.
    pub fn free_within(
        &self,
        day: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let mut free = Vec::new();
        let mut cursor = start;

        if let Some(busy) = self.days.get(&day) {
            for &(b_start, b_end) in busy {
                if b_end <= cursor {
                    continue;
                }
                if b_start >= end {
                    break;
                }
                if b_start > cursor {
                    free.push((cursor, b_start));
                }
                cursor = cursor.max(b_end);
                if cursor >= end {
                    break;
                }
            }
        }

        if cursor < end {
            free.push((cursor, end));
        }
        free
    }

    pub fn claim(&mut self, day: NaiveDate, start: DateTime<Utc>, end: DateTime<Utc>) {
        let busy = self.days.entry(day).or_default();
        let pos = busy.partition_point(|(s, _)| *s < start);
        busy.insert(pos, (start, end));
    }
}

/// Deadline-first ordering: due ascending, importance descending, id for ties.
pub fn deadline_order(a: &AssignmentInput, b: &AssignmentInput) -> Ordering {
    a.due_date
        .cmp(&b.due_date)
        .then_with(|| b.importance.total_cmp(&a.importance))
        .then_with(|| a.id.cmp(&b.id))
}

/// Greedily pack every assignment's remaining effort into its windows.
///
/// Guarantees that no two returned allocations on the same calendar day
/// overlap, across all assignments.
pub fn allocate(
    assignments: &[AssignmentInput],
    windows_by_assignment: &HashMap<String, Vec<AllocationWindow>>,
) -> Vec<Allocation> {
    let mut ordered: Vec<&AssignmentInput> = assignments.iter().collect();
    ordered.sort_by(|a, b| deadline_order(a, b));

    let mut occupied = OccupancyMap::new();
    let mut out = Vec::new();

    for assignment in ordered {
        let mut remaining = assignment.remaining_seconds();
        if remaining <= 0 {
            continue;
        }
        let Some(windows) = windows_by_assignment.get(&assignment.id) else {
            continue;
        };

        for tier in WindowTier::FILL_ORDER {
            let mut tier_windows: Vec<&AllocationWindow> =
                windows.iter().filter(|w| w.tier == tier).collect();
            tier_windows.sort_by_key(|w| (w.day, w.start));

            for window in tier_windows {
                if remaining <= 0 {
                    break;
                }
                for (free_start, free_end) in occupied.free_within(window.day, window.start, window.end) {
                    if remaining <= 0 {
                        break;
                    }
                    let take = (free_end - free_start).num_seconds().min(remaining);
                    if take <= 0 {
                        continue;
                    }
                    let end = free_start + Duration::seconds(take);
                    occupied.claim(window.day, free_start, end);
                    out.push(Allocation {
                        assignment_id: assignment.id.clone(),
                        start: free_start,
                        end,
                        tier,
                        is_overflow: tier.is_overflow(),
                    });
                    remaining -= take;
                }
            }
        }
    }

    out
}

/// Seconds of remaining effort per assignment that `allocations` did not cover.
/// Assignments that were fully packed are omitted.
pub fn unallocated_seconds(
    assignments: &[AssignmentInput],
    allocations: &[Allocation],
) -> HashMap<String, i64> {
    let mut allocated: HashMap<&str, i64> = HashMap::new();
    for a in allocations {
        *allocated.entry(a.assignment_id.as_str()).or_default() += a.duration_seconds();
    }

    assignments
        .iter()
        .filter_map(|a| {
            let short = a.remaining_seconds() - allocated.get(a.id.as_str()).copied().unwrap_or(0);
            (short > 0).then(|| (a.id.clone(), short))
        })
        .collect()
}
