//! JSON payloads exchanged with sync clients.
//!
//! Timestamps travel as RFC3339 strings and are stored as Unix milliseconds.
//! Incoming record timestamps finer than a millisecond are rejected, since
//! last-write-wins compares whole milliseconds.

use chrono::{DateTime, Utc};
use habitsync_core::{ChangeSet, EntryId, Habit, HabitEntry, HabitId, SyncChanges, SyncRecord};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireHabit {
    pub id: HabitId,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default = "default_habit_type")]
    pub habit_type: String,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default)]
    pub schedule: Option<serde_json::Value>,
    #[serde(default)]
    pub carry_over: bool,
    #[serde(default)]
    pub target_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    pub id: EntryId,
    pub habit_id: HabitId,
    pub scheduled_date: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>, I: Deserialize<'de>"))]
pub struct WireChangeSet<T, I> {
    #[serde(default)]
    pub created: Vec<T>,
    #[serde(default)]
    pub updated: Vec<T>,
    #[serde(default)]
    pub deleted: Vec<I>,
}

impl<T, I> Default for WireChangeSet<T, I> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T, I> WireChangeSet<T, I> {
    fn from_core<R>(set: ChangeSet<R>) -> Self
    where
        R: SyncRecord<Id = I>,
        T: From<R>,
    {
        Self {
            created: set.created.into_iter().map(T::from).collect(),
            updated: set.updated.into_iter().map(T::from).collect(),
            deleted: set.deleted,
        }
    }

    fn into_core<R>(self) -> Result<ChangeSet<R>, AppError>
    where
        R: SyncRecord<Id = I> + TryFrom<T, Error = AppError>,
    {
        Ok(ChangeSet {
            created: self
                .created
                .into_iter()
                .map(R::try_from)
                .collect::<Result<_, _>>()?,
            updated: self
                .updated
                .into_iter()
                .map(R::try_from)
                .collect::<Result<_, _>>()?,
            deleted: self.deleted,
        })
    }

    fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Both synchronized kinds, as sent on pull and received on push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireChanges {
    #[serde(default)]
    pub habits: WireChangeSet<WireHabit, HabitId>,
    #[serde(default)]
    pub entries: WireChangeSet<WireEntry, EntryId>,
}

impl WireChanges {
    pub fn len(&self) -> usize {
        self.habits.len() + self.entries.len()
    }

    pub fn into_core(self) -> Result<SyncChanges, AppError> {
        Ok(SyncChanges {
            habits: self.habits.into_core()?,
            entries: self.entries.into_core()?,
        })
    }
}

impl From<SyncChanges> for WireChanges {
    fn from(changes: SyncChanges) -> Self {
        Self {
            habits: WireChangeSet::from_core(changes.habits),
            entries: WireChangeSet::from_core(changes.entries),
        }
    }
}

impl From<Habit> for WireHabit {
    fn from(habit: Habit) -> Self {
        Self {
            id: habit.id,
            user_id: habit.user_id,
            name: habit.name,
            description: habit.description,
            habit_type: habit.habit_type,
            frequency: habit.frequency,
            schedule: habit.schedule,
            carry_over: habit.carry_over,
            target_value: habit.target_value,
            created_at: from_millis(habit.created_at),
            updated_at: from_millis(habit.updated_at),
            archived_at: habit.archived_at.map(from_millis),
        }
    }
}

impl TryFrom<WireHabit> for Habit {
    type Error = AppError;

    fn try_from(habit: WireHabit) -> Result<Self, Self::Error> {
        Ok(Self {
            id: habit.id,
            user_id: habit.user_id,
            name: habit.name,
            description: habit.description,
            habit_type: habit.habit_type,
            frequency: habit.frequency,
            schedule: habit.schedule,
            carry_over: habit.carry_over,
            target_value: habit.target_value,
            created_at: to_millis(habit.created_at, "created_at")?,
            updated_at: to_millis(habit.updated_at, "updated_at")?,
            archived_at: habit
                .archived_at
                .map(|at| to_millis(at, "archived_at"))
                .transpose()?,
        })
    }
}

impl From<HabitEntry> for WireEntry {
    fn from(entry: HabitEntry) -> Self {
        Self {
            id: entry.id,
            habit_id: entry.habit_id,
            scheduled_date: entry.scheduled_date,
            completed_at: from_millis(entry.completed_at),
            value: entry.value,
            created_at: from_millis(entry.created_at),
            updated_at: from_millis(entry.updated_at),
            deleted_at: entry.deleted_at.map(from_millis),
        }
    }
}

impl TryFrom<WireEntry> for HabitEntry {
    type Error = AppError;

    fn try_from(entry: WireEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entry.id,
            habit_id: entry.habit_id,
            scheduled_date: entry.scheduled_date,
            completed_at: to_millis(entry.completed_at, "completed_at")?,
            value: entry.value,
            created_at: to_millis(entry.created_at, "created_at")?,
            updated_at: to_millis(entry.updated_at, "updated_at")?,
            deleted_at: entry
                .deleted_at
                .map(|at| to_millis(at, "deleted_at"))
                .transpose()?,
        })
    }
}

/// Parse a pull watermark.
pub fn parse_since(value: &str) -> Result<i64, AppError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|at| at.timestamp_millis())
        .map_err(|error| {
            AppError::bad_request(format!("`since` must be an RFC3339 timestamp: {error}"))
        })
}

fn to_millis(at: DateTime<Utc>, field: &str) -> Result<i64, AppError> {
    if at.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(AppError::bad_request(format!(
            "`{field}` must not be more precise than a millisecond"
        )));
    }
    Ok(at.timestamp_millis())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn default_habit_type() -> String {
    "boolean".to_string()
}

fn default_frequency() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_since_accepts_offsets_and_rejects_garbage() {
        assert_eq!(parse_since("1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert_eq!(parse_since("1970-01-01T01:00:01+01:00").unwrap(), 1_000);
        assert!(matches!(
            parse_since("yesterday"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn habit_payload_uses_defaults_for_optional_fields() {
        let id = HabitId::new();
        let payload = json!({
            "id": id,
            "user_id": "user-1",
            "name": "Meditate",
            "created_at": "2024-05-01T08:00:00Z",
            "updated_at": "2024-05-01T09:30:00.250Z",
        });

        let habit = Habit::try_from(serde_json::from_value::<WireHabit>(payload).unwrap()).unwrap();
        assert_eq!(habit.id, id);
        assert_eq!(habit.habit_type, "boolean");
        assert_eq!(habit.frequency, "daily");
        assert!(!habit.carry_over);
        assert_eq!(habit.updated_at - habit.created_at, 90 * 60 * 1000 + 250);
        assert_eq!(habit.archived_at, None);
    }

    #[test]
    fn habit_type_is_serialized_as_type() {
        let mut habit = Habit::new("user-1", "Pages");
        habit.habit_type = "numeric".to_string();
        habit.target_value = Some(20.0);

        let value = serde_json::to_value(WireHabit::from(habit)).unwrap();
        assert_eq!(value["type"], "numeric");
        assert!(value.get("habit_type").is_none());
        assert!(value["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn deleted_lists_carry_bare_ids() {
        let mut changes = SyncChanges::default();
        let gone = HabitId::new();
        changes.habits.deleted.push(gone);

        let value = serde_json::to_value(WireChanges::from(changes)).unwrap();
        assert_eq!(value["habits"]["deleted"], json!([gone.to_string()]));
        assert_eq!(value["entries"]["created"], json!([]));
    }

    #[test]
    fn push_payload_may_omit_empty_sections() {
        let entry_id = EntryId::new();
        let payload = json!({ "entries": { "deleted": [entry_id] } });

        let changes: WireChanges = serde_json::from_value(payload).unwrap();
        assert_eq!(changes.len(), 1);
        let batch = changes.into_core().unwrap();
        assert!(batch.habits.is_empty());
        assert_eq!(batch.entries.deleted, vec![entry_id]);
    }

    #[test]
    fn entry_converts_to_core_millis() {
        let habit_id = HabitId::new();
        let payload = json!({
            "id": EntryId::new(),
            "habit_id": habit_id,
            "scheduled_date": "2024-05-01",
            "completed_at": "2024-05-01T07:00:00Z",
            "value": 2.5,
            "created_at": "2024-05-01T07:00:00Z",
            "updated_at": "2024-05-01T07:00:00Z",
            "deleted_at": null,
        });

        let entry =
            HabitEntry::try_from(serde_json::from_value::<WireEntry>(payload).unwrap()).unwrap();
        assert_eq!(entry.habit_id, habit_id);
        assert_eq!(entry.completed_at, entry.created_at);
        assert_eq!(entry.value, Some(2.5));
    }

    #[test]
    fn sub_millisecond_timestamps_are_rejected() {
        let payload = json!({
            "habits": { "updated": [{
                "id": HabitId::new(),
                "user_id": "user-1",
                "name": "Precise",
                "created_at": "2024-05-01T09:00:00Z",
                "updated_at": "2024-05-01T09:00:00.000500Z",
            }] }
        });

        let changes: WireChanges = serde_json::from_value(payload).unwrap();
        let err = changes.into_core().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(message) if message.contains("updated_at")));
    }

    #[test]
    fn whole_millisecond_timestamps_keep_their_value() {
        let at: DateTime<Utc> = "2024-05-01T09:00:00.123Z".parse().unwrap();
        assert_eq!(
            to_millis(at, "updated_at").unwrap(),
            at.timestamp() * 1_000 + 123
        );
    }
}
