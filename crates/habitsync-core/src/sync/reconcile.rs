//! Batch reconciler (push)
//!
//! Stages run in a fixed order: habit creates, updates, deletes, then entry
//! creates, updates, deletes. Each record is committed on its own; the first
//! hard error stops the batch and leaves earlier records applied. Resubmitting
//! the same batch is safe: duplicate creates are ignored, updates are settled
//! by last-write-wins and deletes of tombstoned records are no-ops.

use super::changes::ApplyCounts;
use super::conflict::{resolve_lww, Resolution};
use super::{require_user_id, BatchReport, SyncBatch};
use crate::db::{ChangeLedger, LedgerRecord};
use crate::error::{Error, Result};
use crate::models::{Habit, HabitEntry, SyncConflict, SyncRecord};
use crate::util::{unix_millis_now, user_fingerprint};

/// Applies client batches to the change ledger
pub struct BatchReconciler<'a, L> {
    ledger: &'a L,
}

impl<'a, L: ChangeLedger> BatchReconciler<'a, L> {
    pub const fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Apply `batch` on behalf of `user_id`.
    pub async fn apply_batch(&self, user_id: &str, batch: &SyncBatch) -> Result<BatchReport> {
        let user_id = require_user_id(user_id)?;
        let mut report = BatchReport::default();

        self.apply_creates::<Habit>(user_id, &batch.habits.created, &mut report)
            .await?;
        self.apply_updates::<Habit>(user_id, &batch.habits.updated, &mut report)
            .await?;
        self.apply_deletes::<Habit>(user_id, &batch.habits.deleted, &mut report)
            .await?;
        self.apply_creates::<HabitEntry>(user_id, &batch.entries.created, &mut report)
            .await?;
        self.apply_updates::<HabitEntry>(user_id, &batch.entries.updated, &mut report)
            .await?;
        self.apply_deletes::<HabitEntry>(user_id, &batch.entries.deleted, &mut report)
            .await?;

        tracing::info!(
            user = user_fingerprint(user_id),
            records = batch.len(),
            habits = ?report.habits,
            entries = ?report.entries,
            "Applied sync batch"
        );
        Ok(report)
    }

    async fn apply_creates<R: LedgerRecord>(
        &self,
        user_id: &str,
        records: &[R],
        report: &mut BatchReport,
    ) -> Result<()> {
        for record in records {
            ensure_owner(user_id, record)?;

            let counts = report.counts_mut(R::KIND);
            match self.ledger.insert(record).await {
                Ok(()) => counts.created += 1,
                Err(Error::AlreadyExists(_)) => {
                    tracing::debug!(kind = %R::KIND, id = %record.id(), "Ignoring duplicate create");
                    counts.unchanged += 1;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn apply_updates<R: LedgerRecord>(
        &self,
        user_id: &str,
        records: &[R],
        report: &mut BatchReport,
    ) -> Result<()> {
        for proposed in records {
            ensure_owner(user_id, proposed)?;

            let Some(current) = self.ledger.find_by_id::<R>(proposed.id()).await? else {
                // Edited offline before its create reached the server
                self.ledger.upsert(proposed).await?;
                report.counts_mut(R::KIND).created += 1;
                tracing::debug!(kind = %R::KIND, id = %proposed.id(), "Update of unknown record inserted");
                continue;
            };
            ensure_owner(user_id, &current)?;

            let applied = match resolve_lww(proposed.updated_at(), current.updated_at()) {
                Resolution::Apply => self.ledger.replace_if_newer(proposed).await?,
                Resolution::Discard => false,
            };

            if applied {
                report.counts_mut(R::KIND).updated += 1;
            } else {
                self.discard(user_id, proposed, &current, report.counts_mut(R::KIND))
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_deletes<R: LedgerRecord>(
        &self,
        user_id: &str,
        ids: &[R::Id],
        report: &mut BatchReport,
    ) -> Result<()> {
        for &id in ids {
            let current = self.ledger.find_by_id::<R>(id).await?;
            let Some(current) = current.filter(|record| !record.is_tombstoned()) else {
                report.counts_mut(R::KIND).unchanged += 1;
                continue;
            };
            ensure_owner(user_id, &current)?;

            match self.ledger.tombstone::<R>(id, unix_millis_now()).await {
                Ok(()) => report.counts_mut(R::KIND).deleted += 1,
                Err(Error::NotFound(_)) => report.counts_mut(R::KIND).unchanged += 1,
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn discard<R: LedgerRecord>(
        &self,
        user_id: &str,
        proposed: &R,
        current: &R,
        counts: &mut ApplyCounts,
    ) -> Result<()> {
        tracing::debug!(
            kind = %R::KIND,
            id = %proposed.id(),
            server_updated_at = current.updated_at(),
            incoming_updated_at = proposed.updated_at(),
            "Discarding stale update"
        );
        self.ledger
            .record_conflict(&SyncConflict::lww(
                user_id,
                R::KIND,
                proposed.id(),
                current.updated_at(),
                proposed.updated_at(),
            ))
            .await?;
        counts.discarded += 1;
        Ok(())
    }
}

/// Kinds that carry an owner must belong to the authenticated user.
fn ensure_owner<R: SyncRecord>(user_id: &str, record: &R) -> Result<()> {
    match record.owner_id() {
        Some(owner) if owner != user_id => {
            tracing::warn!(
                user = user_fingerprint(user_id),
                kind = %R::KIND,
                id = %record.id(),
                "Rejected sync write to a record owned by another user"
            );
            Err(Error::Unauthorized(format!(
                "{} {} belongs to another user",
                R::KIND,
                record.id()
            )))
        }
        _ => Ok(()),
    }
}
