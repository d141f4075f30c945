//! Approval workflow for harvest records

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::db::{RecordRepository, SqliteRecordRepository};
use crate::error::{Error, Result};
use crate::events::RecordEvent;
use crate::models::{FieldRecord, RecordId, RecordKind, RecordStatus};
use crate::scope::ScopeResolver;
use crate::util::{next_write_timestamp, normalize_text_option};
use rusqlite::Connection;

/// A reviewer's verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

impl ReviewDecision {
    const fn status(&self) -> RecordStatus {
        match self {
            Self::Approve => RecordStatus::Approved,
            Self::Reject { .. } => RecordStatus::Rejected,
        }
    }
}

/// Approve or reject a pending harvest record.
///
/// The reviewer must hold a reviewing role, have the record inside their
/// scope and not be its owner. Returns the updated record and the event to
/// publish for it.
pub fn review_record(
    conn: &Connection,
    ctx: &RequestContext,
    id: &RecordId,
    decision: &ReviewDecision,
) -> Result<(FieldRecord, RecordEvent)> {
    ctx.authenticate(conn)?;
    if !ctx.role.can_review() {
        return Err(Error::AccessDenied(format!(
            "role {} cannot review records",
            ctx.role
        )));
    }

    let reason = match decision {
        ReviewDecision::Approve => None,
        ReviewDecision::Reject { reason } => Some(
            normalize_text_option(Some(reason.clone()))
                .ok_or_else(|| Error::InvalidInput("rejection reason is required".into()))?,
        ),
    };

    let records = SqliteRecordRepository::new(conn);
    let record = records
        .get(id)?
        .filter(|record| !record.is_deleted)
        .ok_or_else(|| Error::NotFound(format!("record {id}")))?;

    let scope = ScopeResolver::new(conn).resolve(ctx, None)?;
    if !scope.authorizes(&record.org, &record.owner_id, &ctx.actor_id) {
        return Err(Error::AccessDenied(format!(
            "record {id} is outside the caller's scope"
        )));
    }
    if record.owner_id == ctx.actor_id {
        return Err(Error::AccessDenied("cannot review your own record".into()));
    }
    if record.kind() != RecordKind::Harvest {
        return Err(Error::InvalidInput(format!(
            "only harvest records are reviewed, {id} is a {}",
            record.kind().as_str()
        )));
    }
    if record.status != RecordStatus::Pending {
        return Err(Error::InvalidInput(format!(
            "record {id} is already {}",
            record.status.as_str()
        )));
    }

    let reviewed_at = next_write_timestamp(record.updated_at);
    let status = decision.status();
    records.set_review(id, status, &ctx.actor_id, reason.as_deref(), reviewed_at)?;

    tracing::info!(
        record_id = %id,
        reviewer = %ctx.actor_id,
        status = status.as_str(),
        "Record reviewed"
    );

    let reviewed = FieldRecord {
        status,
        reviewed_by: Some(ctx.actor_id.clone()),
        reviewed_at: Some(reviewed_at),
        rejection_reason: reason,
        updated_at: reviewed_at,
        ..record
    };
    let event = RecordEvent::reviewed(reviewed.clone())
        .ok_or_else(|| Error::Database(format!("record {id} is still pending after review")))?;

    Ok((reviewed, event))
}
