//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::record::RecordKind;

/// Strategy label stored for last-write-wins resolutions
pub const LWW_STRATEGY: &str = "lww";

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier (0 until persisted)
    pub id: i64,
    /// User whose push lost the conflict
    pub user_id: String,
    /// Kind of the record involved
    pub record_kind: RecordKind,
    /// Record involved in the conflict
    pub record_id: String,
    /// Server row's timestamp when conflict occurred
    pub server_updated_at: i64,
    /// Incoming row's timestamp that was rejected
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}

impl SyncConflict {
    /// A discarded incoming update under last-write-wins
    pub fn lww(
        user_id: impl Into<String>,
        record_kind: RecordKind,
        record_id: impl ToString,
        server_updated_at: i64,
        incoming_updated_at: i64,
    ) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            record_kind,
            record_id: record_id.to_string(),
            server_updated_at,
            incoming_updated_at,
            resolved_at: chrono::Utc::now().timestamp_millis(),
            strategy: LWW_STRATEGY.to_string(),
        }
    }
}
