//! Time utilities: timezone-aware deadlines and calendar-day boundaries.
//!
//! Everything the engine stores is UTC. Calendar days (what "today" means, where
//! a preferred window starts) are always resolved in the user's timezone.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse a deadline like "2026-02-20 23:59" in an IANA tz like "America/Chicago",
/// returning UTC.
pub fn parse_local_deadline_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let tz: Tz = tz
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))?;

    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .map_err(|e| anyhow::anyhow!("invalid local datetime '{local}': {e}"))?;

    let local_dt = tz
        .from_local_datetime(&ndt)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous or invalid local time (DST?): {local} {tz}"))?;

    Ok(local_dt.with_timezone(&Utc))
}

/// Parse "HH:MM" into a time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid time of day '{s}' (expected HH:MM): {e}"))
}

/// Resolve a local wall-clock time on `date` to a UTC instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap move forward to the first valid instant after the gap.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let ndt = date.and_time(time);
    if let Some(dt) = tz.from_local_datetime(&ndt).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Gaps are at most an hour in every zone chrono-tz ships; step in 15-minute
    // increments so half-hour shifts resolve too.
    for step in 1..=8 {
        let probe = ndt + Duration::minutes(15 * step);
        if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&ndt)
}

/// UTC instant of local midnight starting `date`.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    local_instant(tz, date, NaiveTime::MIN)
}

/// UTC instant of local midnight ending `date` (start of the next day).
pub fn end_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => start_of_day(tz, next),
        None => start_of_day(tz, date) + Duration::days(1),
    }
}

/// Local calendar date of a UTC instant.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Inclusive list of dates from `first` through `last`. Empty when `last < first`.
pub fn days_inclusive(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// Seconds since local midnight, used for hashing time-of-day settings.
pub fn seconds_from_midnight(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.num_seconds_from_midnight()
}
