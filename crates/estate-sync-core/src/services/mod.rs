//! Async service layer shared by every front end.

mod sync_service;

pub use sync_service::SyncService;
