//! Device sync status model

use serde::{Deserialize, Serialize};

/// Sync health of one device, pushed to device-scoped subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSyncStatus {
    pub device_id: String,
    pub is_online: bool,
    /// Records from this device still awaiting review
    pub pending_count: u32,
    /// Records that failed in the device's last batch
    pub failed_count: u32,
    /// Last completed batch (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Distinct devices that have submitted records
    pub unique_device_count: u32,
}

/// Persisted bookkeeping of a device's last batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSyncState {
    pub device_id: String,
    /// Unix ms
    pub last_sync_at: i64,
    pub last_failed_count: u32,
}
