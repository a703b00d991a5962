//! Delta query service (pull)

use super::{require_user_id, SyncDelta};
use crate::db::ChangeLedger;
use crate::error::Result;
use crate::models::{Habit, HabitEntry};
use crate::util::user_fingerprint;

/// Assembles the combined delta for a user from the change ledger
pub struct DeltaQueryService<'a, L> {
    ledger: &'a L,
}

impl<'a, L: ChangeLedger> DeltaQueryService<'a, L> {
    pub const fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Every habit and entry of `user_id` touched after `since` (Unix ms).
    ///
    /// Read-only. A watermark in the future yields empty lists. Ledger errors
    /// are returned as-is; no partial delta is produced.
    pub async fn get_changes(&self, user_id: &str, since: i64) -> Result<SyncDelta> {
        let user_id = require_user_id(user_id)?;

        let habits = self.ledger.changes_since::<Habit>(user_id, since).await?;
        let entries = self
            .ledger
            .changes_since::<HabitEntry>(user_id, since)
            .await?;

        tracing::debug!(
            user = user_fingerprint(user_id),
            since,
            habits_created = habits.created.len(),
            habits_updated = habits.updated.len(),
            habits_deleted = habits.deleted.len(),
            entries_created = entries.created.len(),
            entries_updated = entries.updated.len(),
            entries_deleted = entries.deleted.len(),
            "Assembled sync delta"
        );

        Ok(SyncDelta { habits, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlLedger};
    use crate::error::Error;
    use std::collections::HashSet;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_user_id_is_invalid_input() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection());
        let service = DeltaQueryService::new(&ledger);

        let err = service.get_changes("  ", 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_ledger_yields_empty_delta() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection());
        let service = DeltaQueryService::new(&ledger);

        let delta = service.get_changes("user-1", 0).await.unwrap();
        assert!(delta.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn habit_created_now_appears_only_in_created() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection());
        let service = DeltaQueryService::new(&ledger);

        let habit = Habit::new("user-1", "Journal");
        ledger.insert(&habit).await.unwrap();

        let an_hour_ago = chrono::Utc::now().timestamp_millis() - HOUR_MS;
        let delta = service.get_changes("user-1", an_hour_ago).await.unwrap();

        assert_eq!(delta.habits.created.len(), 1);
        assert_eq!(delta.habits.created[0].id, habit.id);
        assert!(delta.habits.updated.is_empty());
        assert!(delta.habits.deleted.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn future_watermark_yields_empty_delta() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection());
        let service = DeltaQueryService::new(&ledger);

        let habit = Habit::new("user-1", "Journal");
        ledger.insert(&habit).await.unwrap();
        ledger
            .insert(&HabitEntry::new(habit.id, "2024-05-01"))
            .await
            .unwrap();

        let tomorrow = chrono::Utc::now().timestamp_millis() + 24 * HOUR_MS;
        let delta = service.get_changes("user-1", tomorrow).await.unwrap();
        assert!(delta.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delta_buckets_are_disjoint_and_cover_touched_records() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LibSqlLedger::new(db.connection());
        let service = DeltaQueryService::new(&ledger);

        let t = 1_700_000_000_000;
        let mut touched = HashSet::new();

        for (offset, name) in [(-2, "untouched"), (-1, "edited"), (1, "new"), (-3, "gone")] {
            let mut habit = Habit::new("user-1", name);
            habit.created_at = t + offset * HOUR_MS;
            habit.updated_at = habit.created_at;
            if name == "edited" {
                habit.updated_at = t + HOUR_MS;
            }
            ledger.insert(&habit).await.unwrap();
            if name == "gone" {
                ledger.tombstone::<Habit>(habit.id, t + 2 * HOUR_MS).await.unwrap();
            }
            if name != "untouched" {
                touched.insert(habit.id);
            }
        }

        let delta = service.get_changes("user-1", t).await.unwrap();
        let created: HashSet<_> = delta.habits.created.iter().map(|h| h.id).collect();
        let updated: HashSet<_> = delta.habits.updated.iter().map(|h| h.id).collect();
        let deleted: HashSet<_> = delta.habits.deleted.iter().copied().collect();

        assert!(created.is_disjoint(&updated));
        assert!(created.is_disjoint(&deleted));
        assert!(updated.is_disjoint(&deleted));

        let union: HashSet<_> = created
            .union(&updated)
            .chain(deleted.iter())
            .copied()
            .collect();
        assert_eq!(union, touched);
    }
}
