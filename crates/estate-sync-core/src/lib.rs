//! estate-sync-core - Core library for estate-sync
//!
//! Scoped access resolution over a plantation organization tree, offline-first
//! reconciliation of field records submitted by devices, and fan-out of the
//! resulting events and notifications. Used by the CLI and any service front
//! end.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod notify;
pub mod provision;
pub mod query;
pub mod review;
pub mod scope;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use context::RequestContext;
pub use error::{Error, Result};
pub use models::{FieldRecord, RecordId};
pub use scope::Scope;
pub use services::SyncService;
