//! Conflict-resolution primitives
//!
//! Both functions are pure: they look only at record timestamps, so the
//! partition and last-write-wins rules can be tested without a ledger.

use serde::Serialize;

/// Delta bucket a changed record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Outcome of comparing an incoming update against the server record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Incoming payload replaces the server record
    Apply,
    /// Server record is kept; incoming payload is dropped
    Discard,
}

/// Classify a record against a watermark.
///
/// Returns `None` when the record has not been touched after `since`.
/// Tombstones take precedence over creation, creation over update, so every
/// touched record lands in exactly one bucket.
pub fn classify(
    created_at: i64,
    updated_at: i64,
    tombstoned_at: Option<i64>,
    since: i64,
) -> Option<ChangeKind> {
    if tombstoned_at.is_some_and(|at| at > since) {
        Some(ChangeKind::Deleted)
    } else if created_at > since {
        Some(ChangeKind::Created)
    } else if updated_at > since {
        Some(ChangeKind::Updated)
    } else {
        None
    }
}

/// Last-write-wins: the incoming update wins only with a strictly newer timestamp.
pub const fn resolve_lww(incoming_updated_at: i64, current_updated_at: i64) -> Resolution {
    if incoming_updated_at > current_updated_at {
        Resolution::Apply
    } else {
        Resolution::Discard
    }
}
