//! Change ledger: the persistence contract used by delta sync

use libsql::{params_from_iter, Connection, Value};

use super::records::LedgerRecord;
use crate::error::{Error, Result};
use crate::models::SyncConflict;
use crate::sync::conflict::classify;
use crate::sync::ChangeSet;

/// Persistence capabilities the sync engine needs (async)
///
/// Records are never hard-deleted: a tombstoned row stays resolvable by ID.
#[allow(async_fn_in_trait)]
pub trait ChangeLedger {
    /// Fetch a record by ID, live or tombstoned
    async fn find_by_id<R: LedgerRecord>(&self, id: R::Id) -> Result<Option<R>>;

    /// Insert a new record; `Error::AlreadyExists` when the ID is taken
    async fn insert<R: LedgerRecord>(&self, record: &R) -> Result<()>;

    /// Insert or fully replace a record
    async fn upsert<R: LedgerRecord>(&self, record: &R) -> Result<()>;

    /// Replace the stored record only if its `updated_at` is older than the
    /// incoming one, as a single statement. Returns whether a row changed.
    async fn replace_if_newer<R: LedgerRecord>(&self, record: &R) -> Result<bool>;

    /// Mark a live record deleted at `at`; `Error::NotFound` when no live row exists
    async fn tombstone<R: LedgerRecord>(&self, id: R::Id, at: i64) -> Result<()>;

    /// Records of one user touched after `since`, partitioned into
    /// created/updated/deleted
    async fn changes_since<R: LedgerRecord>(
        &self,
        user_id: &str,
        since: i64,
    ) -> Result<ChangeSet<R>>;

    /// Append a resolved conflict to the conflict log
    async fn record_conflict(&self, conflict: &SyncConflict) -> Result<()>;

    /// Most recent conflicts for a user, newest first
    async fn list_conflicts(&self, user_id: &str, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `ChangeLedger`
pub struct LibSqlLedger<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlLedger<'a> {
    /// Create a new ledger over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn select_list<R: LedgerRecord>() -> String {
        R::COLUMNS
            .iter()
            .map(|column| format!("t.{column}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn placeholders<R: LedgerRecord>() -> String {
        vec!["?"; R::COLUMNS.len()].join(", ")
    }

    fn parse_conflict(row: &libsql::Row) -> Result<SyncConflict> {
        let record_kind: String = row.get(2)?;
        Ok(SyncConflict {
            id: row.get(0)?,
            user_id: row.get(1)?,
            record_kind: record_kind.parse().map_err(Error::Database)?,
            record_id: row.get(3)?,
            server_updated_at: row.get(4)?,
            incoming_updated_at: row.get(5)?,
            resolved_at: row.get(6)?,
            strategy: row.get(7)?,
        })
    }
}

impl ChangeLedger for LibSqlLedger<'_> {
    async fn find_by_id<R: LedgerRecord>(&self, id: R::Id) -> Result<Option<R>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.id = ?",
            Self::select_list::<R>(),
            R::TABLE
        );
        let mut rows = self
            .conn
            .query(&sql, params_from_iter([Value::Text(id.to_string())]))
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(R::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert<R: LedgerRecord>(&self, record: &R) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO NOTHING",
            R::TABLE,
            R::COLUMNS.join(", "),
            Self::placeholders::<R>()
        );
        let rows = self
            .conn
            .execute(&sql, params_from_iter(record.to_values()?))
            .await?;

        if rows == 0 {
            return Err(Error::AlreadyExists(format!("{} {}", R::KIND, record.id())));
        }
        Ok(())
    }

    async fn upsert<R: LedgerRecord>(&self, record: &R) -> Result<()> {
        let assignments = R::COLUMNS[1..]
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {assignments}",
            R::TABLE,
            R::COLUMNS.join(", "),
            Self::placeholders::<R>()
        );
        self.conn
            .execute(&sql, params_from_iter(record.to_values()?))
            .await?;
        Ok(())
    }

    async fn replace_if_newer<R: LedgerRecord>(&self, record: &R) -> Result<bool> {
        let assignments = R::COLUMNS[1..]
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE id = ? AND updated_at < ?",
            R::TABLE
        );

        // SET values first, then the WHERE arguments
        let mut values = record.to_values()?;
        let id = values.remove(0);
        values.push(id);
        values.push(Value::Integer(record.updated_at()));

        let rows = self.conn.execute(&sql, params_from_iter(values)).await?;
        Ok(rows > 0)
    }

    async fn tombstone<R: LedgerRecord>(&self, id: R::Id, at: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {table} SET {tomb} = ?1, updated_at = MAX(updated_at, ?1)
             WHERE id = ?2 AND {tomb} IS NULL",
            table = R::TABLE,
            tomb = R::TOMBSTONE_COLUMN
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params_from_iter([Value::Integer(at), Value::Text(id.to_string())]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{} {id}", R::KIND)));
        }
        Ok(())
    }

    async fn changes_since<R: LedgerRecord>(
        &self,
        user_id: &str,
        since: i64,
    ) -> Result<ChangeSet<R>> {
        let sql = format!(
            "SELECT {} {} AND (t.created_at > ? OR t.updated_at > ? OR t.{} > ?)
             ORDER BY t.updated_at ASC, t.id ASC",
            Self::select_list::<R>(),
            R::USER_SCOPE,
            R::TOMBSTONE_COLUMN
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params_from_iter([
                    Value::Text(user_id.to_string()),
                    Value::Integer(since),
                    Value::Integer(since),
                    Value::Integer(since),
                ]),
            )
            .await?;

        let mut changes = ChangeSet::new();
        while let Some(row) = rows.next().await? {
            let record = R::from_row(&row)?;
            if let Some(kind) = classify(
                record.created_at(),
                record.updated_at(),
                record.tombstoned_at(),
                since,
            ) {
                changes.push(kind, record);
            }
        }

        Ok(changes)
    }

    async fn record_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    user_id, record_kind, record_id, server_updated_at,
                    incoming_updated_at, resolved_at, strategy
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params_from_iter([
                    Value::Text(conflict.user_id.clone()),
                    Value::Text(conflict.record_kind.as_str().to_string()),
                    Value::Text(conflict.record_id.clone()),
                    Value::Integer(conflict.server_updated_at),
                    Value::Integer(conflict.incoming_updated_at),
                    Value::Integer(conflict.resolved_at),
                    Value::Text(conflict.strategy.clone()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn list_conflicts(&self, user_id: &str, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, record_kind, record_id, server_updated_at,
                        incoming_updated_at, resolved_at, strategy
                 FROM sync_conflicts
                 WHERE user_id = ?
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                params_from_iter([Value::Text(user_id.to_string()), Value::Integer(limit)]),
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }
}
