//! Vehicles still inside an estate

use serde::{Deserialize, Serialize};

use super::{FieldRecord, GateIntent, OrgPath, RecordId, RecordPayload};

/// An entry gate check with no matching exit yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInside {
    pub record_id: RecordId,
    /// Security officer who logged the entry
    pub owner_id: String,
    pub org: OrgPath,
    pub vehicle_plate: String,
    pub driver_name: String,
    pub destination: Option<String>,
    /// Unix ms; the record's creation time when the device sent none
    pub entry_time: i64,
    /// Minutes inside as of the check, never negative
    pub duration_minutes: i64,
}

impl VehicleInside {
    /// View of an entry record at `now`; `None` for anything but an entry
    pub fn from_entry(record: &FieldRecord, now: i64) -> Option<Self> {
        let RecordPayload::GuestLog(guest) = &record.payload else {
            return None;
        };
        if guest.intent != GateIntent::Entry {
            return None;
        }

        let entry_time = guest.entry_time.unwrap_or(record.created_at);
        Some(Self {
            record_id: record.id,
            owner_id: record.owner_id.clone(),
            org: record.org.clone(),
            vehicle_plate: guest.vehicle_plate.clone(),
            driver_name: guest.driver_name.clone(),
            destination: guest.destination.clone(),
            entry_time,
            duration_minutes: (now.saturating_sub(entry_time) / 60_000).max(0),
        })
    }
}
