//! habitsync-core - Core library for habitsync
//!
//! This crate contains the synchronizable models, the change ledger and its
//! libSQL implementation, and the delta sync engine (pull and push) used by
//! the API server.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{EntryId, Habit, HabitEntry, HabitId, RecordKind, SyncConflict, SyncRecord};
pub use services::SyncService;
pub use sync::{BatchReport, ChangeSet, SyncBatch, SyncChanges, SyncDelta};
pub use util::user_fingerprint;
