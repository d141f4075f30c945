//! Database layer for estate-sync

mod actor_repository;
mod assignment_repository;
mod connection;
mod migrations;
mod notification_repository;
mod org_repository;
mod record_repository;
mod sync_state_repository;

pub use actor_repository::{ActorRepository, SqliteActorRepository};
pub use assignment_repository::{AssignedActor, AssignmentRepository, SqliteAssignmentRepository};
pub use connection::Database;
pub use notification_repository::{NotificationRepository, SqliteNotificationRepository};
pub use org_repository::{OrgRepository, SqliteOrgRepository};
pub use record_repository::{RecordFilter, RecordRepository, SqliteRecordRepository};
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};

/// Wrap a domain error raised while decoding a column
fn conversion_error(column: usize, error: crate::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}

/// LIMIT/OFFSET operand; counts beyond `i64::MAX` saturate
fn sql_count(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
