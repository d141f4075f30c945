use chrono::Utc;
use estate_sync_core::models::{ChangeCursor, FieldRecord, RecordId};
use estate_sync_core::query::RecordQuery;
use estate_sync_core::{RequestContext, SyncService};

use crate::commands::common::{format_record_lines, record_to_list_item, RecordListItem};
use crate::error::CliError;

/// Listing mode of the `records` command
pub enum RecordSelection {
    Scoped(RecordQuery),
    /// The caller's own changes after a cursor, deletions included
    Since { cursor: ChangeCursor, limit: usize },
}

pub async fn run_records(
    service: &SyncService,
    ctx: &RequestContext,
    selection: RecordSelection,
    as_json: bool,
) -> Result<(), CliError> {
    let records = match selection {
        RecordSelection::Scoped(query) => service.list_records(ctx, &query).await?,
        RecordSelection::Since { cursor, limit } => {
            service.records_since(ctx, &cursor, limit).await?
        }
    };

    print_records(&records, as_json)
}

/// Cursor from `--since` and an optional `--after-id`
pub fn change_cursor(since: i64, after_id: Option<&str>) -> Result<ChangeCursor, CliError> {
    Ok(ChangeCursor {
        updated_at: since,
        id: after_id.map(str::parse::<RecordId>).transpose()?,
    })
}

fn print_records(records: &[FieldRecord], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let now_ms = Utc::now().timestamp_millis();
        let items = records
            .iter()
            .map(|record| record_to_list_item(record, now_ms))
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if records.is_empty() {
        println!("No records");
    } else {
        for line in format_record_lines(records) {
            println!("{line}");
        }
    }

    Ok(())
}
