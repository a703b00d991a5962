//! Shared services used by the API server

mod sync;

pub use sync::SyncService;
