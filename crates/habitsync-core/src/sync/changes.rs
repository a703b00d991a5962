//! Change sets exchanged between client and server

use serde::Serialize;

use super::conflict::ChangeKind;
use crate::models::{Habit, HabitEntry, RecordKind, SyncRecord};

/// Created, updated and deleted records of one kind.
///
/// Deletions carry only the record ID.
#[derive(Debug, Clone)]
pub struct ChangeSet<R: SyncRecord> {
    pub created: Vec<R>,
    pub updated: Vec<R>,
    pub deleted: Vec<R::Id>,
}

impl<R: SyncRecord> ChangeSet<R> {
    pub const fn new() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Place a record in the bucket named by `kind`
    pub fn push(&mut self, kind: ChangeKind, record: R) {
        match kind {
            ChangeKind::Created => self.created.push(record),
            ChangeKind::Updated => self.updated.push(record),
            ChangeKind::Deleted => self.deleted.push(record.id()),
        }
    }

    /// Total number of records across all buckets
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: SyncRecord> Default for ChangeSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes for every synchronized kind.
///
/// The same shape flows in both directions: the server answers a pull with a
/// [`SyncDelta`] and a client pushes a [`SyncBatch`].
#[derive(Debug, Clone, Default)]
pub struct SyncChanges {
    pub habits: ChangeSet<Habit>,
    pub entries: ChangeSet<HabitEntry>,
}

/// Server-to-client changes since a watermark
pub type SyncDelta = SyncChanges;

/// Client-proposed changes to reconcile
pub type SyncBatch = SyncChanges;

impl SyncChanges {
    pub fn len(&self) -> usize {
        self.habits.len() + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happened to the records of one kind during a push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    /// Inserted, including updates of unknown IDs
    pub created: usize,
    /// Replaced by a newer client payload
    pub updated: usize,
    /// Client update lost last-write-wins
    pub discarded: usize,
    /// Tombstoned
    pub deleted: usize,
    /// Duplicate creates and deletes of absent or tombstoned records
    pub unchanged: usize,
}

/// Outcome of a successfully applied batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub habits: ApplyCounts,
    pub entries: ApplyCounts,
}

impl BatchReport {
    pub(crate) fn counts_mut(&mut self, kind: RecordKind) -> &mut ApplyCounts {
        match kind {
            RecordKind::Habit => &mut self.habits,
            RecordKind::Entry => &mut self.entries,
        }
    }
}
