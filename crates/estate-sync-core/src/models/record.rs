//! Field record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::OrgPath;
use crate::error::Error;

/// Server identifier of a field record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("invalid record id '{s}'")))
    }
}

/// Kind of field-collected record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Harvest,
    GuestLog,
}

impl RecordKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::GuestLog => "guest_log",
        }
    }

    /// Entity type recorded on notifications about this kind of record
    pub const fn entity_type(self) -> &'static str {
        match self {
            Self::Harvest => "HARVEST_RECORD",
            Self::GuestLog => "GATE_CHECK_RECORD",
        }
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "harvest" => Ok(Self::Harvest),
            "guest_log" => Ok(Self::GuestLog),
            other => Err(Error::InvalidInput(format!("unknown record kind '{other}'"))),
        }
    }
}

/// Review status of a field record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RecordStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Canonicalize a status string, accepting legacy lowercase spellings
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| Error::InvalidInput(format!("unknown status '{s}'")))
    }
}

/// Direction of a gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateIntent {
    Entry,
    Exit,
}

/// Harvest entry captured by a field supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestPayload {
    /// Harvest date (Unix ms)
    pub harvest_date: i64,
    /// Worker name or employee number
    pub worker: String,
    pub bunch_count: u32,
    pub weight_kg: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Guest / vehicle log captured at a gate post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestLogPayload {
    pub vehicle_plate: String,
    #[serde(default)]
    pub driver_name: String,
    pub intent: GateIntent,
    /// Entry time (Unix ms)
    #[serde(default)]
    pub entry_time: Option<i64>,
    /// Exit time (Unix ms)
    #[serde(default)]
    pub exit_time: Option<i64>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Typed payload of a field record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    Harvest(HarvestPayload),
    GuestLog(GuestLogPayload),
}

impl RecordPayload {
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Harvest(_) => RecordKind::Harvest,
            Self::GuestLog(_) => RecordKind::GuestLog,
        }
    }

    /// Check field-level constraints of the payload
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Harvest(harvest) => {
                if harvest.worker.trim().is_empty() {
                    return Err(Error::InvalidInput("harvest worker is required".into()));
                }
                if harvest.bunch_count == 0 {
                    return Err(Error::InvalidInput(
                        "harvest bunch count must be greater than zero".into(),
                    ));
                }
                if !harvest.weight_kg.is_finite() || harvest.weight_kg < 0.0 {
                    return Err(Error::InvalidInput(
                        "harvest weight must be a non-negative number".into(),
                    ));
                }
            }
            Self::GuestLog(guest) => {
                if guest.vehicle_plate.trim().is_empty() {
                    return Err(Error::InvalidInput("vehicle plate is required".into()));
                }
                if let (Some(entry), Some(exit)) = (guest.entry_time, guest.exit_time) {
                    if exit < entry {
                        return Err(Error::InvalidInput(
                            "exit time cannot precede entry time".into(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A field-collected record as persisted on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub id: RecordId,
    pub local_id: Option<String>,
    pub device_id: Option<String>,
    /// Submitting actor
    pub owner_id: String,
    pub org: OrgPath,
    pub status: RecordStatus,
    pub payload: RecordPayload,
    pub reviewed_by: Option<String>,
    /// Review timestamp (Unix ms)
    pub reviewed_at: Option<i64>,
    pub rejection_reason: Option<String>,
    /// Soft delete flag for sync
    pub is_deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl FieldRecord {
    pub const fn kind(&self) -> RecordKind {
        self.payload.kind()
    }
}

/// Position in the stream of changes ordered by `(updated_at, id)`.
///
/// A pull returns the changes strictly after the cursor. Without an id the
/// cursor stands after every change at `updated_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCursor {
    /// Unix ms
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
}

impl ChangeCursor {
    pub const fn since(updated_at: i64) -> Self {
        Self {
            updated_at,
            id: None,
        }
    }

    /// The cursor just past `record`
    pub const fn after(record: &FieldRecord) -> Self {
        Self {
            updated_at: record.updated_at,
            id: Some(record.id),
        }
    }
}
