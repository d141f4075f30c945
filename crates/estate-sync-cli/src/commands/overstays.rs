use std::time::Duration;

use estate_sync_core::events::{Channel, DomainEvent, Topic};
use estate_sync_core::{RequestContext, SyncService};
use tokio_util::sync::CancellationToken;

use crate::commands::common::format_overstay_lines;
use crate::error::CliError;

pub async fn run_overstays(
    service: &SyncService,
    ctx: &RequestContext,
    watch: Option<u64>,
    as_json: bool,
) -> Result<(), CliError> {
    if let Some(period) = watch {
        return watch_overstays(service, ctx, Duration::from_secs(period.max(1))).await;
    }

    let vehicles = service.overstays(ctx).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&vehicles)?);
    } else if vehicles.is_empty() {
        println!("No vehicles overstaying");
    } else {
        for line in format_overstay_lines(&vehicles) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Print each new alert inside the caller's scope until the process stops
async fn watch_overstays(
    service: &SyncService,
    ctx: &RequestContext,
    period: Duration,
) -> Result<(), CliError> {
    let scope = service.resolve_scope(ctx, None).await?;
    let token = CancellationToken::new();
    let mut alerts = service.subscribe(token.clone(), Channel::Topic(Topic::VehicleOverstay));
    let monitor = service.spawn_overstay_monitor(token.clone(), period);

    while let Some(event) = alerts.recv().await {
        let DomainEvent::Overstay(inside) = event else {
            continue;
        };
        if scope.authorizes(&inside.org, &inside.owner_id, &ctx.actor_id) {
            println!("{}", serde_json::to_string(&inside)?);
        }
    }

    token.cancel();
    monitor.abort();
    Ok(())
}
