//! Common view over every synchronizable entity kind

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The entity kinds that take part in delta sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Habit,
    Entry,
}

impl RecordKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Entry => "entry",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habit" => Ok(Self::Habit),
            "entry" => Ok(Self::Entry),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

/// A record whose changes are tracked by the change ledger.
///
/// All timestamps are Unix milliseconds. `updated_at` is the only value used
/// for conflict resolution.
pub trait SyncRecord: Clone + Send + Sync {
    /// Identifier type of this kind
    type Id: Copy + Eq + fmt::Display + fmt::Debug + Send + Sync;

    /// Kind tag used for logging and the conflict log
    const KIND: RecordKind;

    fn id(&self) -> Self::Id;

    /// Owning user, for kinds that carry their own owner.
    ///
    /// Entries return `None`: they inherit ownership from their habit and
    /// are not checked individually during sync.
    fn owner_id(&self) -> Option<&str>;

    fn created_at(&self) -> i64;

    fn updated_at(&self) -> i64;

    /// Soft delete timestamp (`None` while the record is live)
    fn tombstoned_at(&self) -> Option<i64>;

    fn is_tombstoned(&self) -> bool {
        self.tombstoned_at().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_parses_its_own_labels() {
        for kind in [RecordKind::Habit, RecordKind::Entry] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("note".parse::<RecordKind>().is_err());
    }
}
