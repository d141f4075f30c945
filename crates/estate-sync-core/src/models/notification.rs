//! Persisted notification model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::Role;
use crate::error::Error;

/// Kind of occurrence a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    HarvestApprovalNeeded,
    HarvestApproved,
    HarvestRejected,
    GateCheckCreated,
    GateCheckCompleted,
    GateOverstayAlert,
}

impl NotificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HarvestApprovalNeeded => "HARVEST_APPROVAL_NEEDED",
            Self::HarvestApproved => "HARVEST_APPROVED",
            Self::HarvestRejected => "HARVEST_REJECTED",
            Self::GateCheckCreated => "GATE_CHECK_CREATED",
            Self::GateCheckCompleted => "GATE_CHECK_COMPLETED",
            Self::GateOverstayAlert => "GATE_OVERSTAY_ALERT",
        }
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HARVEST_APPROVAL_NEEDED" => Ok(Self::HarvestApprovalNeeded),
            "HARVEST_APPROVED" => Ok(Self::HarvestApproved),
            "HARVEST_REJECTED" => Ok(Self::HarvestRejected),
            "GATE_CHECK_CREATED" => Ok(Self::GateCheckCreated),
            "GATE_CHECK_COMPLETED" => Ok(Self::GateCheckCompleted),
            "GATE_OVERSTAY_ALERT" => Ok(Self::GateOverstayAlert),
            other => Err(Error::InvalidInput(format!(
                "unknown notification type '{other}'"
            ))),
        }
    }
}

/// Urgency level of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl NotificationPriority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(Error::InvalidInput(format!("unknown priority '{other}'"))),
        }
    }
}

/// A notification persisted for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub idempotency_key: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub recipient_id: String,
    pub recipient_role: Role,
    pub related_entity_type: String,
    pub related_entity_id: String,
    /// Flat, unschematized metadata
    pub metadata: BTreeMap<String, String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// A notification about to be persisted; the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub idempotency_key: String,
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub recipient_id: String,
    pub recipient_role: Role,
    pub related_entity_type: String,
    pub related_entity_id: String,
    pub metadata: BTreeMap<String, String>,
}
