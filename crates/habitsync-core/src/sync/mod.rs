//! Offline delta synchronization
//!
//! Pull: [`DeltaQueryService`] returns everything a user's records went
//! through since a watermark. Push: [`BatchReconciler`] applies a client
//! batch against server state with last-write-wins.

mod changes;
pub mod conflict;
mod delta;
mod reconcile;

pub use changes::{ApplyCounts, BatchReport, ChangeSet, SyncBatch, SyncChanges, SyncDelta};
pub use conflict::{classify, resolve_lww, ChangeKind, Resolution};
pub use delta::DeltaQueryService;
pub use reconcile::BatchReconciler;

use crate::error::{Error, Result};

/// Reject empty or whitespace-only user ids
fn require_user_id(user_id: &str) -> Result<&str> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidInput("User ID must not be empty".to_string()));
    }
    Ok(user_id)
}
