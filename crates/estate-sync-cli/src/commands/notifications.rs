use estate_sync_core::{RequestContext, SyncService};

use crate::commands::common::format_notification_lines;
use crate::error::CliError;

pub async fn run_notifications(
    service: &SyncService,
    ctx: &RequestContext,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let notifications = service.notifications_for(ctx, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&notifications)?);
    } else if notifications.is_empty() {
        println!("No notifications");
    } else {
        for line in format_notification_lines(&notifications) {
            println!("{line}");
        }
    }

    Ok(())
}
