//! Data models for habitsync

mod entry;
mod habit;
mod record;
mod sync_conflict;

pub use entry::{EntryId, HabitEntry};
pub use habit::{Habit, HabitId};
pub use record::{RecordKind, SyncRecord};
pub use sync_conflict::SyncConflict;
