//! Habit model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::record::{RecordKind, SyncRecord};

/// A unique identifier for a habit, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(Uuid);

impl HabitId {
    /// Create a new unique habit ID using UUID v7
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

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HabitId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A habit owned by a single user
///
/// `habit_type`, `frequency` and `schedule` are validated by the CRUD layer;
/// sync copies them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier
    pub id: HabitId,
    /// Owning user
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub habit_type: String,
    pub frequency: String,
    /// Opaque schedule document
    pub schedule: Option<serde_json::Value>,
    /// Whether unfinished targets carry over to the next period
    pub carry_over: bool,
    pub target_value: Option<f64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Archive (tombstone) timestamp (Unix ms)
    pub archived_at: Option<i64>,
}

impl Habit {
    /// Create a new live habit for `user_id`
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: HabitId::new(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            habit_type: "boolean".to_string(),
            frequency: "daily".to_string(),
            schedule: None,
            carry_over: false,
            target_value: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }
}

impl SyncRecord for Habit {
    type Id = HabitId;

    const KIND: RecordKind = RecordKind::Habit;

    fn id(&self) -> HabitId {
        self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn tombstoned_at(&self) -> Option<i64> {
        self.archived_at
    }
}
