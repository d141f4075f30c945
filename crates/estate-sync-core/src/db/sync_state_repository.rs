//! Per-device sync bookkeeping

use crate::error::Result;
use crate::models::DeviceSyncState;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for device sync state storage
pub trait SyncStateRepository {
    /// Record a finished batch for a device
    fn record_batch(&self, device_id: &str, synced_at: i64, failed_count: u32) -> Result<()>;

    /// Last recorded state of a device
    fn get(&self, device_id: &str) -> Result<Option<DeviceSyncState>>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn record_batch(&self, device_id: &str, synced_at: i64, failed_count: u32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO device_sync_state (device_id, last_sync_at, last_failed_count)
             VALUES (?, ?, ?)
             ON CONFLICT(device_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                last_failed_count = excluded.last_failed_count",
            params![device_id, synced_at, failed_count],
        )?;
        Ok(())
    }

    fn get(&self, device_id: &str) -> Result<Option<DeviceSyncState>> {
        let state = self
            .conn
            .query_row(
                "SELECT device_id, last_sync_at, last_failed_count
                 FROM device_sync_state WHERE device_id = ?",
                params![device_id],
                |row| {
                    Ok(DeviceSyncState {
                        device_id: row.get(0)?,
                        last_sync_at: row.get(1)?,
                        last_failed_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }
}
