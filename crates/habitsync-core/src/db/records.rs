//! Row mapping for the synchronizable kinds

#![allow(clippy::cast_precision_loss)] // SQLite may hand back whole REALs as INTEGER

use std::fmt::Display;
use std::str::FromStr;

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::{Habit, HabitEntry, SyncRecord};

/// A sync record stored in its own ledger table.
///
/// Rows are always selected with the table aliased as `t`.
pub trait LedgerRecord: SyncRecord + 'static {
    const TABLE: &'static str;

    /// Column names in `to_values` order, `id` first
    const COLUMNS: &'static [&'static str];

    /// Nullable column holding the soft delete timestamp
    const TOMBSTONE_COLUMN: &'static str;

    /// `FROM ... WHERE` fragment limiting rows to one user, with a single
    /// `?` placeholder for the user id
    const USER_SCOPE: &'static str;

    fn to_values(&self) -> Result<Vec<Value>>;

    fn from_row(row: &Row) -> Result<Self>;
}

impl LedgerRecord for Habit {
    const TABLE: &'static str = "habits";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "name",
        "description",
        "habit_type",
        "frequency",
        "schedule",
        "carry_over",
        "target_value",
        "created_at",
        "updated_at",
        "archived_at",
    ];
    const TOMBSTONE_COLUMN: &'static str = "archived_at";
    const USER_SCOPE: &'static str = "FROM habits t WHERE t.user_id = ?";

    fn to_values(&self) -> Result<Vec<Value>> {
        let schedule = self
            .schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.user_id.clone()),
            Value::Text(self.name.clone()),
            optional_text(self.description.clone()),
            Value::Text(self.habit_type.clone()),
            Value::Text(self.frequency.clone()),
            optional_text(schedule),
            Value::Integer(i64::from(self.carry_over)),
            optional_real(self.target_value),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
            optional_integer(self.archived_at),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let schedule = text_at(row, 6)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        Ok(Self {
            id: parse_id(&row.get::<String>(0)?)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: text_at(row, 3)?,
            habit_type: row.get(4)?,
            frequency: row.get(5)?,
            schedule,
            carry_over: row.get::<i32>(7)? != 0,
            target_value: real_at(row, 8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            archived_at: integer_at(row, 11)?,
        })
    }
}

impl LedgerRecord for HabitEntry {
    const TABLE: &'static str = "habit_entries";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "habit_id",
        "scheduled_date",
        "completed_at",
        "value",
        "created_at",
        "updated_at",
        "deleted_at",
    ];
    const TOMBSTONE_COLUMN: &'static str = "deleted_at";
    const USER_SCOPE: &'static str =
        "FROM habit_entries t JOIN habits h ON h.id = t.habit_id WHERE h.user_id = ?";

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.habit_id.as_str()),
            Value::Text(self.scheduled_date.clone()),
            Value::Integer(self.completed_at),
            optional_real(self.value),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
            optional_integer(self.deleted_at),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.get::<String>(0)?)?,
            habit_id: parse_id(&row.get::<String>(1)?)?,
            scheduled_date: row.get(2)?,
            completed_at: row.get(3)?,
            value: real_at(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: integer_at(row, 7)?,
        })
    }
}

fn parse_id<T>(raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|error| Error::Database(format!("Invalid record ID `{raw}`: {error}")))
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

fn text_at(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(unexpected(idx, &other)),
    }
}

fn integer_at(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(unexpected(idx, &other)),
    }
}

fn real_at(row: &Row, idx: i32) -> Result<Option<f64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Real(value) => Ok(Some(value)),
        Value::Integer(value) => Ok(Some(value as f64)),
        other => Err(unexpected(idx, &other)),
    }
}

fn unexpected(idx: i32, value: &Value) -> Error {
    Error::Database(format!("Unexpected value in column {idx}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_match_value_count() {
        let habit = Habit::new("user-1", "Stretch");
        assert_eq!(habit.to_values().unwrap().len(), Habit::COLUMNS.len());

        let entry = HabitEntry::new(habit.id, "2024-05-01");
        assert_eq!(entry.to_values().unwrap().len(), HabitEntry::COLUMNS.len());

        assert_eq!(Habit::COLUMNS[0], "id");
        assert_eq!(HabitEntry::COLUMNS[0], "id");
    }

    #[test]
    fn parse_id_reports_bad_ids_as_database_errors() {
        let err = parse_id::<crate::models::HabitId>("not-a-uuid").unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
