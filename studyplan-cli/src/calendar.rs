use chrono::{DateTime, Utc};
use std::collections::HashMap;
use studyplan_core::{Assignment, ItemKind, PlannedDay, ScheduleItem};

pub struct CalendarEvent {
    pub uid: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub summary: String,
    pub description: String,
}

fn titles(assignments: &[Assignment]) -> HashMap<&str, &str> {
    assignments
        .iter()
        .map(|a| (a.id.as_str(), a.title.as_str()))
        .collect()
}

/// One event per plan block, titled after its assignment.
pub fn plan_to_events(plan: &[PlannedDay], assignments: &[Assignment]) -> Vec<CalendarEvent> {
    let titles = titles(assignments);
    plan.iter()
        .flat_map(|day| day.blocks.iter())
        .map(|b| {
            let title = titles.get(b.assignment_id.as_str()).copied().unwrap_or(b.assignment_id.as_str());
            let mut description = format!("AssignmentId: {}\n", b.assignment_id);
            if let Some(reason) = &b.overflow_reason {
                description.push_str(&format!("Overflow: {reason}\n"));
            }
            CalendarEvent {
                uid: b.id.clone(),
                start_utc: b.start,
                end_utc: b.end,
                summary: format!("Study: {title}"),
                description,
            }
        })
        .collect()
}

/// Study and custom items from a week of sessions. Breaks and meals are left
/// out of the calendar.
pub fn sessions_to_events(items: &[ScheduleItem]) -> Vec<CalendarEvent> {
    items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Study | ItemKind::Custom))
        .map(|i| CalendarEvent {
            uid: i.id.clone(),
            start_utc: i.start,
            end_utc: i.end,
            summary: match i.kind {
                ItemKind::Study => format!("Study: {}", i.title),
                _ => i.title.clone(),
            },
            description: i
                .assignment_id
                .as_ref()
                .map(|id| format!("AssignmentId: {id}\n"))
                .unwrap_or_default(),
        })
        .collect()
}

/// Emit a minimal ICS calendar containing VEVENT blocks.
///
/// DTSTART/DTEND are UTC. UIDs come from block ids, so re-exporting an
/// unchanged cached plan produces the same events.
pub fn events_to_ics(events: &[CalendarEvent]) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:-//Studyplan//EN\n");

    for e in events {
        let dtstart = e.start_utc.format("%Y%m%dT%H%M%SZ");
        let dtend = e.end_utc.format("%Y%m%dT%H%M%SZ");

        s.push_str("BEGIN:VEVENT\n");
        s.push_str(&format!("UID:{}@studyplan\n", e.uid));
        s.push_str(&format!("DTSTART:{}\n", dtstart));
        s.push_str(&format!("DTEND:{}\n", dtend));
        s.push_str(&format!("SUMMARY:{}\n", escape_ics(&e.summary)));
        if !e.description.is_empty() {
            s.push_str(&format!("DESCRIPTION:{}\n", escape_ics(&e.description)));
        }
        s.push_str("END:VEVENT\n");
    }

    s.push_str("END:VCALENDAR\n");
    s
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}
