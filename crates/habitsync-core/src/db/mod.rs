//! Database layer for habitsync

mod connection;
mod ledger;
mod migrations;
mod records;

pub use connection::Database;
pub use ledger::{ChangeLedger, LibSqlLedger};
pub use records::LedgerRecord;
