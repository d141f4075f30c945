use estate_sync_core::SyncService;

use crate::commands::common::format_timestamp;
use crate::error::CliError;

pub async fn run_status(
    service: &SyncService,
    device_id: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let status = service.device_status(device_id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let last_sync = status
        .last_sync_at
        .map_or_else(|| "never".to_string(), format_timestamp);
    println!("Device:        {}", status.device_id);
    println!("Online:        {}", if status.is_online { "yes" } else { "no" });
    println!("Last sync:     {last_sync}");
    println!("Pending:       {}", status.pending_count);
    println!("Failed:        {}", status.failed_count);
    println!("Known devices: {}", status.unique_device_count);
    Ok(())
}
