//! Habit entry (completion) model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::habit::HabitId;
use super::record::{RecordKind, SyncRecord};

/// A unique identifier for a habit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A recorded completion of a habit on a scheduled date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Parent habit; ownership flows through it
    pub habit_id: HabitId,
    /// Scheduled date as sent by the client (e.g. `2024-05-01`)
    pub scheduled_date: String,
    /// Completion timestamp (Unix ms)
    pub completed_at: i64,
    pub value: Option<f64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete timestamp (Unix ms)
    pub deleted_at: Option<i64>,
}

impl HabitEntry {
    /// Create a new entry completed now
    #[must_use]
    pub fn new(habit_id: HabitId, scheduled_date: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntryId::new(),
            habit_id,
            scheduled_date: scheduled_date.into(),
            completed_at: now,
            value: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl SyncRecord for HabitEntry {
    type Id = EntryId;

    const KIND: RecordKind = RecordKind::Entry;

    fn id(&self) -> EntryId {
        self.id
    }

    fn owner_id(&self) -> Option<&str> {
        None
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn tombstoned_at(&self) -> Option<i64> {
        self.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_new_has_no_owner_of_its_own() {
        let entry = HabitEntry::new(HabitId::new(), "2024-05-01");
        assert!(entry.owner_id().is_none());
        assert!(!entry.is_tombstoned());
        assert_eq!(entry.completed_at, entry.created_at);
    }
}
