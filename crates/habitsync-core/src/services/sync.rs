//! Shared sync service wrapper used by request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{ChangeLedger, Database, LibSqlLedger};
use crate::models::SyncConflict;
use crate::sync::{BatchReconciler, BatchReport, DeltaQueryService, SyncBatch, SyncDelta};
use crate::Result;

/// Thread-safe service for pull, push and conflict log operations.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<Mutex<Database>>,
}

impl SyncService {
    /// Open a sync service backed by the database at the given path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening sync database at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory sync service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Changes to the user's habits and entries after `since` (Unix ms).
    pub async fn pull(&self, user_id: &str, since: i64) -> Result<SyncDelta> {
        let db = self.db.lock().await;
        let ledger = LibSqlLedger::new(db.connection());
        DeltaQueryService::new(&ledger)
            .get_changes(user_id, since)
            .await
    }

    /// Reconcile a client batch against server state.
    pub async fn push(&self, user_id: &str, batch: &SyncBatch) -> Result<BatchReport> {
        let db = self.db.lock().await;
        let ledger = LibSqlLedger::new(db.connection());
        BatchReconciler::new(&ledger)
            .apply_batch(user_id, batch)
            .await
    }

    /// Most recent last-write-wins discards for the user.
    pub async fn list_conflicts(&self, user_id: &str, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let ledger = LibSqlLedger::new(db.connection());
        ledger.list_conflicts(user_id, limit).await
    }
}
