use std::collections::HashMap;
use std::thread;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use studyplan_core::{
    Assignment, AssignmentInput, ItemKind, MemoryStore, PlannedDay, RegenerationController,
    ScheduleSettings, SharedController, StudyStrategy, UserPreferences, allocate, generate_schedule,
    generate_week, time::local_date, unallocated_seconds, windows_for,
};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

fn utc_settings() -> ScheduleSettings {
    ScheduleSettings::new(t(17, 0), t(18, 0), chrono_tz::UTC)
}

fn all_blocks(plan: &[PlannedDay]) -> Vec<&studyplan_core::DailyAssignmentBlock> {
    plan.iter().flat_map(|d| d.blocks.iter()).collect()
}

fn mixed_load() -> Vec<AssignmentInput> {
    vec![
        AssignmentInput::new("essay", now() + Duration::days(4), 6.0).with_importance(5.0),
        AssignmentInput::new("quiz", now() + Duration::hours(30), 1.5).with_importance(2.0),
        AssignmentInput::new("lab", now() + Duration::days(2), 4.0).with_completed(1.0),
        AssignmentInput::new("reading", now() + Duration::hours(6), 3.0),
        AssignmentInput::new("overdue", now() - Duration::hours(2), 2.0),
    ]
}

fn assert_invariants(inputs: &[AssignmentInput], plan: &[PlannedDay], settings: &ScheduleSettings, now: DateTime<Utc>) {
    let due: HashMap<&str, DateTime<Utc>> = inputs.iter().map(|a| (a.id.as_str(), a.due_date)).collect();
    let mut blocks = all_blocks(plan);
    blocks.sort_by_key(|b| b.start);

    for pair in blocks.windows(2) {
        assert!(pair[0].end <= pair[1].start, "overlap: {:?} / {:?}", pair[0], pair[1]);
    }
    for b in &blocks {
        assert!(b.start >= now, "block in the past: {b:?}");
        assert!(b.end <= due[b.assignment_id.as_str()], "block after deadline: {b:?}");
        assert!(b.end > b.start);
    }

    // Shortfall over the same days and windows the plan was built from.
    let days: Vec<NaiveDate> = plan.iter().map(|d| d.date).collect();
    let windows: HashMap<_, _> = inputs
        .iter()
        .map(|a| {
            let w = windows_for(a, &days, settings.preferred_start, settings.preferred_end, now, settings.timezone);
            (a.id.clone(), w)
        })
        .collect();
    let short = unallocated_seconds(inputs, &allocate(inputs, &windows));

    for a in inputs {
        let packed: i64 = blocks
            .iter()
            .filter(|b| b.assignment_id == a.id)
            .map(|b| (b.end - b.start).num_seconds())
            .sum();
        let missing = short.get(&a.id).copied().unwrap_or(0);
        assert_eq!(packed, a.remaining_seconds() - missing, "{} packed {packed}s", a.id);
        if missing > 0 && a.due_date > now {
            assert!(plan.iter().any(|d| !d.all_on_track), "{} short but plan on track", a.id);
        }
    }
}

#[test]
fn test_two_hours_over_three_days_uses_two_preferred_evenings() {
    let a = AssignmentInput::new("a", now() + Duration::days(3), 2.0);
    let plan = generate_schedule(&[a], &utc_settings(), now());
    let blocks = all_blocks(&plan);

    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.duration_hours() == 1.0));
    assert!(blocks.iter().all(|b| b.preferred_hours == 1.0 && b.overflow_reason.is_none()));
    assert_ne!(blocks[0].start.date_naive(), blocks[1].start.date_naive());
    assert_eq!(blocks[0].start, Utc.with_ymd_and_hms(2026, 10, 19, 17, 0, 0).unwrap());
}

#[test]
fn test_half_hour_due_soon_is_packed_immediately() {
    let a = AssignmentInput::new("b", now() + Duration::minutes(30), 0.5);
    let plan = generate_schedule(&[a], &utc_settings(), now());
    let blocks = all_blocks(&plan);

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].start, now());
    assert_eq!(blocks[0].end, now() + Duration::minutes(30));
    assert!(plan[0].all_on_track);
}

#[test]
fn test_importance_breaks_deadline_ties() {
    let due = Utc.with_ymd_and_hms(2026, 10, 19, 22, 0, 0).unwrap();
    let x = AssignmentInput::new("x", due, 1.0).with_importance(5.0);
    let y = AssignmentInput::new("y", due, 1.0).with_importance(1.0);
    let plan = generate_schedule(&[y, x], &utc_settings(), now());
    let blocks = all_blocks(&plan);

    let x_block = blocks.iter().find(|b| b.assignment_id == "x").unwrap();
    assert_eq!(x_block.start, Utc.with_ymd_and_hms(2026, 10, 19, 17, 0, 0).unwrap());
    assert!(x_block.overflow_reason.is_none());
    let y_block = blocks.iter().find(|b| b.assignment_id == "y").unwrap();
    assert!(y_block.overflow_hours > 0.0);
}

#[test]
fn test_empty_input_clears_a_held_plan() {
    assert!(generate_schedule(&[], &utc_settings(), now()).is_empty());

    let mut controller = RegenerationController::new(MemoryStore::new(), "acct", utc_settings());
    controller
        .update_assignments(vec![AssignmentInput::new("a", now() + Duration::days(1), 1.0)], now())
        .unwrap();
    assert!(!controller.plan().is_empty());

    let outcome = controller.update_assignments(Vec::new(), now()).unwrap();
    assert!(outcome.cleared);
    assert!(controller.plan().is_empty());
}

#[test]
fn test_mixed_load_keeps_invariants() {
    let inputs = mixed_load();
    let plan = generate_schedule(&inputs, &utc_settings(), now());
    assert_invariants(&inputs, &plan, &utc_settings(), now());

    // Overdue work never gets a block.
    assert!(all_blocks(&plan).iter().all(|b| b.assignment_id != "overdue"));
    // Reading is due at 15:00 and only has morning time; all three hours fit there.
    let reading: f64 = all_blocks(&plan)
        .iter()
        .filter(|b| b.assignment_id == "reading")
        .map(|b| b.duration_hours())
        .sum();
    assert!((reading - 3.0).abs() < 1e-9);
}

#[test]
fn test_invariants_hold_across_dst_change() {
    let chicago = ScheduleSettings::new(t(17, 0), t(18, 0), chrono_tz::America::Chicago);
    // Saturday before US clocks fall back on 2026-11-01.
    let start = Utc.with_ymd_and_hms(2026, 10, 31, 14, 0, 0).unwrap();
    let inputs = vec![
        AssignmentInput::new("p", start + Duration::days(3), 9.0).with_importance(4.0),
        AssignmentInput::new("q", start + Duration::days(2), 5.0),
    ];
    let plan = generate_schedule(&inputs, &chicago, start);
    assert_invariants(&inputs, &plan, &chicago, start);
    assert!(plan.iter().any(|d| d.date == NaiveDate::from_ymd_opt(2026, 11, 1).unwrap()));
}

#[test]
fn test_preferred_is_filled_before_other_tiers() {
    let a = AssignmentInput::new("a", now() + Duration::days(2), 3.0);
    let plan = generate_schedule(&[a], &utc_settings(), now());
    let preferred: f64 = all_blocks(&plan).iter().map(|b| b.preferred_hours).sum();
    // Only the Monday and Tuesday evenings fall before Wednesday 09:00.
    assert_eq!(preferred, 2.0);
    assert!(all_blocks(&plan).iter().any(|b| b.overflow_hours > 0.0));
}

#[test]
fn test_repeated_notifications_generate_once() {
    let mut controller = RegenerationController::new(MemoryStore::new(), "acct", utc_settings());
    for _ in 0..3 {
        controller.update_assignments(mixed_load(), now()).unwrap();
    }
    assert_eq!(controller.generations(), 1);
    assert_eq!(controller.store().batches(), 1);
}

#[test]
fn test_shared_controller_serializes_notifications() {
    let shared = SharedController::new(RegenerationController::new(MemoryStore::new(), "acct", utc_settings()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || shared.update_assignments(mixed_load(), now()).unwrap())
        })
        .collect();
    let regenerated = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| o.did_regenerate)
        .count();

    assert_eq!(regenerated, 1);
    assert_eq!(shared.generations().unwrap(), 1);
    assert!(!shared.plan().unwrap().is_empty());
}

#[test]
fn test_week_of_sessions_never_overlaps() {
    let prefs = UserPreferences::default().with_strategy(StudyStrategy::ActiveRecall);
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let records = vec![
        Assignment::new("e", "Research essay", start + Duration::days(5)),
        Assignment::new("w", "Worksheet 4", start + Duration::days(1)),
        Assignment::new("r", "Study guide chapter 3", start + Duration::days(14)).undated(),
    ];
    let items = generate_week(&prefs, &records, local_date(prefs.schedule.timezone, start), start);

    for pair in items.windows(2) {
        assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    for item in items.iter().filter(|i| i.kind == ItemKind::Study) {
        let record = records.iter().find(|r| Some(&r.id) == item.assignment_id.as_ref()).unwrap();
        if record.has_real_due_date {
            assert!(item.end <= record.due_date);
        }
        assert!(item.start >= start);
    }
}

#[test]
fn test_overloaded_assignment_is_short_and_flagged() {
    let a = AssignmentInput::new("cram", now() + Duration::hours(5), 10.0);
    let plan = generate_schedule(&[a.clone()], &utc_settings(), now());
    assert_invariants(&[a], &plan, &utc_settings(), now());

    let packed: f64 = all_blocks(&plan).iter().map(|b| b.duration_hours()).sum();
    assert!(packed > 0.0 && packed < 10.0);
    assert!(!plan[0].all_on_track);
}
