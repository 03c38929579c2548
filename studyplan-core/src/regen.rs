//! Regeneration controller: decides when to recompute the plan and when to
//! reuse the one already held.
//!
//! State: the held plan plus the hashes of the assignment set and settings it
//! was generated from. Every notification recomputes both hashes; only a
//! difference triggers the schedule generator. Plan and hashes are persisted
//! together in one store batch, keyed per account.
//!
//! States:
//! - idle/loaded: plan matches the last-known hashes
//! - checking: a notification arrived, hashes are being compared
//! - regenerating: hashes differ, plan is replaced and persisted
//! - unchanged: hashes match, nothing happens

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::AssignmentInput;
use crate::hashing::{assignment_fingerprint, assignments_hash, djb2, settings_hash};
use crate::schedule::{PlannedDay, generate_schedule};
use crate::settings::ScheduleSettings;
use crate::time::local_date;

/// Bumped whenever the serialized plan layout changes. Records written under a
/// different version are discarded, never reinterpreted.
pub const CACHE_FORMAT_VERSION: &str = "3";

/// A stored plan whose last day is older than this is treated as expired.
pub const STALE_GRACE_DAYS: i64 = 7;

/// Key-value persistence collaborator.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write every entry or none of them.
    fn put_batch(&mut self, entries: Vec<(String, String)>) -> Result<()>;
}

/// In-process store, mostly for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    batches: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put_batch` calls so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put_batch(&mut self, entries: Vec<(String, String)>) -> Result<()> {
        self.entries.extend(entries);
        self.batches += 1;
        Ok(())
    }
}

/// Account-scoped store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub plan: String,
    pub assignments_hash: String,
    pub settings_hash: String,
    pub format_version: String,
}

impl CacheKeys {
    pub fn for_account(account: &str) -> Self {
        Self {
            plan: format!("{account}.schedule.plan"),
            assignments_hash: format!("{account}.schedule.assignments_hash"),
            settings_hash: format!("{account}.schedule.settings_hash"),
            format_version: format!("{account}.schedule.format_version"),
        }
    }
}

/// What the controller persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub assignments_hash: u64,
    pub settings_hash: u64,
    pub format_version: String,
    pub plan: Vec<PlannedDay>,
}

impl CacheRecord {
    fn to_entries(&self, keys: &CacheKeys) -> Result<Vec<(String, String)>> {
        let plan = serde_json::to_string(&self.plan).context("serialize plan")?;
        Ok(vec![
            (keys.plan.clone(), plan),
            (keys.assignments_hash.clone(), format_hash(self.assignments_hash)),
            (keys.settings_hash.clone(), format_hash(self.settings_hash)),
            (keys.format_version.clone(), self.format_version.clone()),
        ])
    }

    fn read(store: &impl KeyValueStore, keys: &CacheKeys) -> Result<CacheRecord, MissReason> {
        let get = |key: &str| -> Result<String, MissReason> {
            store
                .get(key)
                .map_err(|e| MissReason::Unreadable(format!("{e:#}")))?
                .ok_or(MissReason::NoRecord)
        };

        let format_version = get(&keys.format_version)?;
        if format_version != CACHE_FORMAT_VERSION {
            return Err(MissReason::FormatVersion(format_version));
        }

        let assignments_hash = parse_hash(&get(&keys.assignments_hash)?)?;
        let settings_hash = parse_hash(&get(&keys.settings_hash)?)?;
        let plan = serde_json::from_str(&get(&keys.plan)?)
            .map_err(|e| MissReason::Unreadable(format!("plan: {e}")))?;

        Ok(CacheRecord {
            assignments_hash,
            settings_hash,
            format_version,
            plan,
        })
    }

    /// The stored assignments hash on its own, whatever state the rest of the
    /// record is in.
    fn stored_assignments_hash(store: &impl KeyValueStore, keys: &CacheKeys) -> Option<u64> {
        let raw = store.get(&keys.assignments_hash).ok().flatten()?;
        parse_hash(&raw).ok()
    }
}

fn format_hash(h: u64) -> String {
    format!("{h:016x}")
}

fn parse_hash(s: &str) -> Result<u64, MissReason> {
    u64::from_str_radix(s.trim(), 16).map_err(|e| MissReason::Unreadable(format!("hash '{s}': {e}")))
}

/// Why a stored plan was not reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    NoRecord,
    FormatVersion(String),
    Unreadable(String),
    HashMismatch,
    Expired,
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissReason::NoRecord => f.write_str("no stored plan"),
            MissReason::FormatVersion(v) => write!(f, "format version {v} != {CACHE_FORMAT_VERSION}"),
            MissReason::Unreadable(e) => write!(f, "unreadable record: {e}"),
            MissReason::HashMismatch => f.write_str("inputs changed since plan was stored"),
            MissReason::Expired => f.write_str("stored plan is too old"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Hit,
    Miss(MissReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    CacheHit,
    CacheMiss,
    AssignmentChanged,
    SettingsChanged,
    Regenerated,
    Unchanged,
    Cleared,
    LoadNotificationSuppressed,
}

/// Structured record of one controller decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub assignment_id: Option<String>,
    pub before_hash: Option<u64>,
    pub after_hash: Option<u64>,
    pub detail: Option<String>,
}

impl TraceEvent {
    fn new(kind: TraceKind) -> Self {
        Self {
            kind,
            assignment_id: None,
            before_hash: None,
            after_hash: None,
            detail: None,
        }
    }

    fn hashes(mut self, before: Option<u64>, after: Option<u64>) -> Self {
        self.before_hash = before;
        self.after_hash = after;
        self
    }

    fn assignment(mut self, id: &str) -> Self {
        self.assignment_id = Some(id.to_string());
        self
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Hook receiving every [`TraceEvent`].
pub trait TraceSink: Send {
    fn record(&self, event: &TraceEvent);
}

impl<F> TraceSink for F
where
    F: Fn(&TraceEvent) + Send,
{
    fn record(&self, event: &TraceEvent) {
        self(event)
    }
}

/// Sink that keeps events in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: TraceKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl TraceSink for TraceLog {
    fn record(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Result of one check pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenOutcome {
    pub did_regenerate: bool,
    pub cleared: bool,
    pub assignments_hash: u64,
    pub settings_hash: u64,
}

/// Owns the authoritative plan for one account.
pub struct RegenerationController<S: KeyValueStore> {
    store: S,
    keys: CacheKeys,
    assignments: Vec<AssignmentInput>,
    settings: ScheduleSettings,
    plan: Vec<PlannedDay>,
    last_assignments_hash: Option<u64>,
    last_settings_hash: Option<u64>,
    fingerprints: BTreeMap<String, u64>,
    just_loaded: bool,
    generations: u64,
    sink: Option<Box<dyn TraceSink>>,
}

impl<S: KeyValueStore> RegenerationController<S> {
    pub fn new(store: S, account: &str, settings: ScheduleSettings) -> Self {
        Self {
            store,
            keys: CacheKeys::for_account(account),
            assignments: Vec::new(),
            settings,
            plan: Vec::new(),
            last_assignments_hash: None,
            last_settings_hash: None,
            fingerprints: BTreeMap::new(),
            just_loaded: false,
            generations: 0,
            sink: None,
        }
    }

    pub fn with_trace(mut self, sink: impl TraceSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn plan(&self) -> &[PlannedDay] {
        &self.plan
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of times the schedule generator has run.
    pub fn generations(&self) -> u64 {
        self.generations
    }

    pub fn last_hashes(&self) -> (Option<u64>, Option<u64>) {
        (self.last_assignments_hash, self.last_settings_hash)
    }

    /// Restore the persisted plan if it is still valid for these inputs,
    /// otherwise regenerate.
    ///
    /// A stored record is trusted only when its format version is current, its
    /// hashes match the inputs, and it still has a day no older than
    /// [`STALE_GRACE_DAYS`]. Unreadable records count as misses.
    pub fn load(
        &mut self,
        assignments: &[AssignmentInput],
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<LoadOutcome> {
        let a_hash = assignments_hash(assignments);
        let s_hash = settings_hash(settings);

        let outcome = match self.validate_stored(a_hash, s_hash, settings, now) {
            Ok(record) => {
                self.assignments = assignments.to_vec();
                self.settings = settings.clone();
                self.fingerprints = fingerprints(assignments);
                self.plan = record.plan;
                self.last_assignments_hash = Some(a_hash);
                self.last_settings_hash = Some(s_hash);
                self.emit(TraceEvent::new(TraceKind::CacheHit).hashes(None, Some(a_hash)));
                LoadOutcome::Hit
            }
            Err(reason) => {
                if matches!(reason, MissReason::Unreadable(_)) {
                    warn!(target: "studyplan::regen", %reason, "discarding stored plan");
                }
                self.emit(
                    TraceEvent::new(TraceKind::CacheMiss)
                        .hashes(None, Some(a_hash))
                        .detail(reason.to_string()),
                );
                if assignments.is_empty() {
                    // A stale record for a non-empty set must still be cleared.
                    self.last_assignments_hash = CacheRecord::stored_assignments_hash(&self.store, &self.keys);
                }
                self.check_and_maybe_regenerate(assignments, settings, now)?;
                LoadOutcome::Miss(reason)
            }
        };

        self.just_loaded = true;
        Ok(outcome)
    }

    /// Compare fresh hashes with the held ones and regenerate on change.
    ///
    /// An empty assignment set clears the plan, but only when the previous set
    /// was non-empty. Right after [`load`](Self::load), one empty notification is
    /// ignored as a loading artifact.
    pub fn check_and_maybe_regenerate(
        &mut self,
        assignments: &[AssignmentInput],
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<RegenOutcome> {
        let a_hash = assignments_hash(assignments);
        let s_hash = settings_hash(settings);
        let just_loaded = std::mem::take(&mut self.just_loaded);

        let mut outcome = RegenOutcome {
            did_regenerate: false,
            cleared: false,
            assignments_hash: a_hash,
            settings_hash: s_hash,
        };

        if assignments.is_empty() {
            if just_loaded {
                self.emit(
                    TraceEvent::new(TraceKind::LoadNotificationSuppressed)
                        .hashes(self.last_assignments_hash, Some(a_hash)),
                );
                return Ok(outcome);
            }

            let empty = djb2("");
            let had_assignments = self.last_assignments_hash.is_some_and(|h| h != empty);
            self.settings = settings.clone();
            if !had_assignments {
                self.emit(TraceEvent::new(TraceKind::Unchanged).hashes(self.last_assignments_hash, Some(a_hash)));
                return Ok(outcome);
            }

            let before = self.last_assignments_hash;
            self.assignments.clear();
            self.fingerprints.clear();
            self.commit(Vec::new(), a_hash, s_hash)?;
            self.emit(TraceEvent::new(TraceKind::Cleared).hashes(before, Some(a_hash)));
            info!(target: "studyplan::regen", "no assignments left, cleared plan");
            outcome.cleared = true;
            return Ok(outcome);
        }

        self.assignments = assignments.to_vec();
        self.settings = settings.clone();

        if self.last_assignments_hash == Some(a_hash) && self.last_settings_hash == Some(s_hash) {
            self.emit(TraceEvent::new(TraceKind::Unchanged).hashes(Some(a_hash), Some(a_hash)));
            return Ok(outcome);
        }

        self.trace_diff(assignments, s_hash);
        self.fingerprints = fingerprints(assignments);
        self.regenerate(a_hash, s_hash, now)?;
        outcome.did_regenerate = true;
        Ok(outcome)
    }

    /// A completed assignment sync: diff against the held settings.
    pub fn update_assignments(&mut self, assignments: Vec<AssignmentInput>, now: DateTime<Utc>) -> Result<RegenOutcome> {
        let settings = self.settings.clone();
        self.check_and_maybe_regenerate(&assignments, &settings, now)
    }

    /// Settings edit: diff against the held assignments.
    pub fn settings_changed(&mut self, settings: ScheduleSettings, now: DateTime<Utc>) -> Result<RegenOutcome> {
        let assignments = self.assignments.clone();
        self.check_and_maybe_regenerate(&assignments, &settings, now)
    }

    /// Regenerate from the held inputs regardless of hashes.
    pub fn force_regenerate(&mut self, now: DateTime<Utc>) -> Result<RegenOutcome> {
        self.just_loaded = false;
        let a_hash = assignments_hash(&self.assignments);
        let s_hash = settings_hash(&self.settings);
        self.regenerate(a_hash, s_hash, now)?;
        Ok(RegenOutcome {
            did_regenerate: true,
            cleared: self.assignments.is_empty(),
            assignments_hash: a_hash,
            settings_hash: s_hash,
        })
    }

    fn validate_stored(
        &self,
        a_hash: u64,
        s_hash: u64,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<CacheRecord, MissReason> {
        let record = CacheRecord::read(&self.store, &self.keys)?;
        if record.assignments_hash != a_hash || record.settings_hash != s_hash {
            return Err(MissReason::HashMismatch);
        }
        let cutoff = local_date(settings.timezone, now) - Duration::days(STALE_GRACE_DAYS);
        if !record.plan.iter().any(|d| d.date >= cutoff) {
            return Err(MissReason::Expired);
        }
        Ok(record)
    }

    fn regenerate(&mut self, a_hash: u64, s_hash: u64, now: DateTime<Utc>) -> Result<()> {
        let before = self.last_assignments_hash;
        let plan = generate_schedule(&self.assignments, &self.settings, now);
        self.generations += 1;
        let days = plan.len();
        self.commit(plan, a_hash, s_hash)?;

        self.emit(
            TraceEvent::new(TraceKind::Regenerated)
                .hashes(before, Some(a_hash))
                .detail(format!("{days} days")),
        );
        info!(
            target: "studyplan::regen",
            assignments = self.assignments.len(),
            days,
            hash = %format_hash(a_hash),
            "regenerated plan"
        );
        Ok(())
    }

    /// Hold the new plan and persist it with its hashes as one batch. The held
    /// hashes only move once the batch is written, so a failed write is retried
    /// by the next check with the same inputs.
    fn commit(&mut self, plan: Vec<PlannedDay>, a_hash: u64, s_hash: u64) -> Result<()> {
        self.plan = plan;

        let record = CacheRecord {
            assignments_hash: a_hash,
            settings_hash: s_hash,
            format_version: CACHE_FORMAT_VERSION.to_string(),
            plan: self.plan.clone(),
        };
        let entries = record.to_entries(&self.keys)?;
        self.store.put_batch(entries).context("persist plan")?;

        self.last_assignments_hash = Some(a_hash);
        self.last_settings_hash = Some(s_hash);
        Ok(())
    }

    fn trace_diff(&self, assignments: &[AssignmentInput], s_hash: u64) {
        let fresh = fingerprints(assignments);
        for (id, hash) in &fresh {
            let before = self.fingerprints.get(id).copied();
            if before != Some(*hash) {
                self.emit(
                    TraceEvent::new(TraceKind::AssignmentChanged)
                        .assignment(id)
                        .hashes(before, Some(*hash)),
                );
            }
        }
        for (id, hash) in &self.fingerprints {
            if !fresh.contains_key(id) {
                self.emit(
                    TraceEvent::new(TraceKind::AssignmentChanged)
                        .assignment(id)
                        .hashes(Some(*hash), None)
                        .detail("removed"),
                );
            }
        }
        if self.last_settings_hash != Some(s_hash) {
            self.emit(TraceEvent::new(TraceKind::SettingsChanged).hashes(self.last_settings_hash, Some(s_hash)));
        }
    }

    fn emit(&self, event: TraceEvent) {
        debug!(
            target: "studyplan::regen",
            kind = ?event.kind,
            assignment = event.assignment_id.as_deref().unwrap_or("-"),
            before = ?event.before_hash,
            after = ?event.after_hash,
            "trace"
        );
        if let Some(sink) = &self.sink {
            sink.record(&event);
        }
    }
}

fn fingerprints(assignments: &[AssignmentInput]) -> BTreeMap<String, u64> {
    assignments
        .iter()
        .map(|a| (a.id.clone(), djb2(&assignment_fingerprint(a))))
        .collect()
}

/// Thread-safe handle: concurrent notifications run one check pass at a time,
/// so plan and hashes are always written together. Last write wins.
pub struct SharedController<S: KeyValueStore> {
    inner: Arc<Mutex<RegenerationController<S>>>,
}

impl<S: KeyValueStore> Clone for SharedController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KeyValueStore> SharedController<S> {
    pub fn new(controller: RegenerationController<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut RegenerationController<S>) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("regeneration controller lock poisoned"))?;
        f(&mut guard)
    }

    pub fn load(
        &self,
        assignments: &[AssignmentInput],
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<LoadOutcome> {
        self.with(|c| c.load(assignments, settings, now))
    }

    pub fn check_and_maybe_regenerate(
        &self,
        assignments: &[AssignmentInput],
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<RegenOutcome> {
        self.with(|c| c.check_and_maybe_regenerate(assignments, settings, now))
    }

    pub fn update_assignments(&self, assignments: Vec<AssignmentInput>, now: DateTime<Utc>) -> Result<RegenOutcome> {
        self.with(|c| c.update_assignments(assignments, now))
    }

    pub fn settings_changed(&self, settings: ScheduleSettings, now: DateTime<Utc>) -> Result<RegenOutcome> {
        self.with(|c| c.settings_changed(settings, now))
    }

    pub fn force_regenerate(&self, now: DateTime<Utc>) -> Result<RegenOutcome> {
        self.with(|c| c.force_regenerate(now))
    }

    /// Snapshot of the held plan.
    pub fn plan(&self) -> Result<Vec<PlannedDay>> {
        self.with(|c| Ok(c.plan().to_vec()))
    }

    pub fn generations(&self) -> Result<u64> {
        self.with(|c| Ok(c.generations()))
    }
}
