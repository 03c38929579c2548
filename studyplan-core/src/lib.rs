//! studyplan-core: Scheduling engine for the Studyplan assistant

pub mod allocator;
pub mod assignment;
pub mod estimator;
pub mod hashing;
pub mod regen;
pub mod schedule;
pub mod sessions;
pub mod settings;
pub mod time;
pub mod window;

pub use allocator::{Allocation, OccupancyMap, allocate, deadline_order, unallocated_seconds};
pub use assignment::{Assignment, AssignmentInput, inputs_from_assignments};
pub use estimator::{Estimate, estimate, priority};
pub use hashing::{assignments_hash, djb2, settings_hash};
pub use regen::{
    CacheKeys, KeyValueStore, LoadOutcome, MemoryStore, MissReason, RegenOutcome,
    RegenerationController, SharedController, TraceEvent, TraceKind, TraceLog, TraceSink,
};
pub use schedule::{DailyAssignmentBlock, PlannedDay, generate_schedule, generate_schedule_now};
pub use sessions::{ItemKind, ScheduleItem, generate_week};
pub use settings::{FixedBlock, HomeRoutine, MAX_HORIZON_DAYS, ScheduleSettings, StudyStrategy, UserPreferences};
pub use window::{AllocationWindow, WindowTier, windows_for};
