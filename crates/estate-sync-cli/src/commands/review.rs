use estate_sync_core::models::RecordId;
use estate_sync_core::review::ReviewDecision;
use estate_sync_core::{RequestContext, SyncService};

use crate::commands::common::{format_timestamp, record_summary};
use crate::error::CliError;

pub fn decision_from_flags(
    approve: bool,
    reject: Option<String>,
) -> Result<ReviewDecision, CliError> {
    match (approve, reject) {
        (true, None) => Ok(ReviewDecision::Approve),
        (false, Some(reason)) => Ok(ReviewDecision::Reject { reason }),
        _ => Err(CliError::MissingDecision),
    }
}

pub async fn run_review(
    service: &SyncService,
    ctx: &RequestContext,
    id: &str,
    decision: &ReviewDecision,
    as_json: bool,
) -> Result<(), CliError> {
    let id: RecordId = id.parse()?;
    let record = service.review(ctx, &id, decision).await?;
    service.flush().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        let reviewed_at = record
            .reviewed_at
            .map_or_else(|| "-".to_string(), format_timestamp);
        println!(
            "{} {} at {reviewed_at} ({})",
            record.id,
            record.status.as_str(),
            record_summary(&record)
        );
        if let Some(reason) = &record.rejection_reason {
            println!("Reason: {reason}");
        }
    }

    Ok(())
}
