//! Sync batch wire models

use serde::{Deserialize, Serialize};

use super::{OrgRefs, RecordId, RecordPayload};
use crate::error::Error;

/// What the client wants done with a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    #[default]
    Create,
    Update,
    Delete,
}

/// One client-authored record delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDelta {
    /// Device-assigned identifier, stable across retries
    pub local_id: String,
    #[serde(default)]
    pub server_id: Option<RecordId>,
    #[serde(default)]
    pub operation: SyncOperation,
    /// The client's view of the server record's last modification (Unix ms)
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub org: OrgRefs,
    pub payload: RecordPayload,
    /// Optional embedded photo as a `data:<mime>;base64,<data>` URI
    #[serde(default)]
    pub photo: Option<String>,
}

/// A client-submitted batch; ephemeral, only its effects are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    pub device_id: String,
    /// Client clock at submission (Unix ms)
    pub client_timestamp: i64,
    pub records: Vec<RecordDelta>,
}

/// Category of a per-record failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncErrorKind {
    AccessDenied,
    Validation,
    NotFound,
    Storage,
}

impl SyncErrorKind {
    /// Classify a core error for the per-record result
    pub const fn classify(error: &Error) -> Self {
        match error {
            Error::AccessDenied(_) | Error::Unauthenticated(_) => Self::AccessDenied,
            Error::InvalidInput(_) | Error::Serialization(_) => Self::Validation,
            Error::NotFound(_) => Self::NotFound,
            Error::ScopeResolution { .. }
            | Error::Database(_)
            | Error::Sqlite(_)
            | Error::Io(_) => Self::Storage,
        }
    }
}

/// Per-record result of a sync batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub local_id: String,
    pub server_id: Option<RecordId>,
    pub success: bool,
    pub conflict_detected: bool,
    pub error: Option<String>,
    pub error_kind: Option<SyncErrorKind>,
}

impl SyncOutcome {
    pub fn persisted(local_id: impl Into<String>, server_id: RecordId) -> Self {
        Self {
            local_id: local_id.into(),
            server_id: Some(server_id),
            success: true,
            conflict_detected: false,
            error: None,
            error_kind: None,
        }
    }

    /// Server-wins resolution: successful, flagged, server id returned
    pub fn conflict(local_id: impl Into<String>, server_id: RecordId) -> Self {
        Self {
            conflict_detected: true,
            ..Self::persisted(local_id, server_id)
        }
    }

    pub fn failed(local_id: impl Into<String>, server_id: Option<RecordId>, error: &Error) -> Self {
        Self {
            local_id: local_id.into(),
            server_id,
            success: false,
            conflict_detected: false,
            error: Some(error.to_string()),
            error_kind: Some(SyncErrorKind::classify(error)),
        }
    }
}

/// Batch-level counters, always derived from the outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub records_processed: u32,
    pub records_successful: u32,
    pub records_failed: u32,
    pub conflicts_detected: u32,
}

impl SyncSummary {
    pub fn from_outcomes(outcomes: &[SyncOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            summary.records_processed += 1;
            if outcome.success {
                summary.records_successful += 1;
            } else {
                summary.records_failed += 1;
            }
            if outcome.conflict_detected {
                summary.conflicts_detected += 1;
            }
            summary
        })
    }
}

/// Synchronous response returned to the submitting device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(flatten)]
    pub summary: SyncSummary,
    pub results: Vec<SyncOutcome>,
    /// Server clock when the batch finished (Unix ms)
    pub server_timestamp: i64,
}

impl SyncResponse {
    pub fn new(results: Vec<SyncOutcome>, server_timestamp: i64) -> Self {
        Self {
            summary: SyncSummary::from_outcomes(&results),
            results,
            server_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_folds_outcomes() {
        let outcomes = vec![
            SyncOutcome::persisted("a", RecordId::new()),
            SyncOutcome::conflict("b", RecordId::new()),
            SyncOutcome::failed("c", None, &Error::AccessDenied("outside scope".into())),
        ];

        assert_eq!(
            SyncSummary::from_outcomes(&outcomes),
            SyncSummary {
                records_processed: 3,
                records_successful: 2,
                records_failed: 1,
                conflicts_detected: 1,
            }
        );
    }

    #[test]
    fn failed_outcome_classifies_error() {
        let outcome = SyncOutcome::failed("x", None, &Error::InvalidInput("bad photo".into()));
        assert_eq!(outcome.error_kind, Some(SyncErrorKind::Validation));
        assert!(outcome.error.unwrap().contains("bad photo"));
    }

    #[test]
    fn batch_deserializes_from_camel_case() {
        let payload = r#"
        {
          "deviceId": "device-1",
          "clientTimestamp": 1700000000000,
          "records": [{
            "localId": "local-1",
            "org": { "blockId": "block-1" },
            "payload": {
              "kind": "harvest",
              "harvestDate": 1700000000000,
              "worker": "NIK-7",
              "bunchCount": 12,
              "weightKg": 150.5
            }
          }]
        }
        "#;

        let batch: SyncBatch = serde_json::from_str(payload).unwrap();
        assert_eq!(batch.records.len(), 1);
        let record = &batch.records[0];
        assert_eq!(record.operation, SyncOperation::Create);
        assert_eq!(record.server_id, None);
        assert_eq!(record.org.block_id.as_deref(), Some("block-1"));
    }

    #[test]
    fn response_flattens_summary() {
        let response = SyncResponse::new(vec![SyncOutcome::persisted("a", RecordId::new())], 5);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["recordsProcessed"], 1);
        assert_eq!(json["results"][0]["localId"], "a");
    }
}
