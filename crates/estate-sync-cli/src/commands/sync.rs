use std::path::Path;

use estate_sync_core::events::{Channel, DomainEvent};
use estate_sync_core::models::SyncBatch;
use estate_sync_core::{RequestContext, SyncService};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::TopicArg;
use crate::commands::common::{format_outcome_lines, parse_batch_lines, read_input};
use crate::error::CliError;

pub async fn run_sync(
    service: &SyncService,
    ctx: &RequestContext,
    path: Option<&Path>,
    as_json: bool,
) -> Result<(), CliError> {
    let raw = read_input(path)?;
    let batch: SyncBatch = serde_json::from_str(&raw)?;

    let response = service.sync(ctx, &batch).await?;
    service.flush().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        for line in format_outcome_lines(&response) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Submit each batch in turn, printing the events it raised as JSON lines.
///
/// Overstay alerts are checked after every batch.
pub async fn run_ingest(
    service: &SyncService,
    ctx: &RequestContext,
    path: Option<&Path>,
    topics: &[TopicArg],
    devices: &[String],
) -> Result<(), CliError> {
    let raw = read_input(path)?;
    let batches = parse_batch_lines(&raw)?;

    let token = CancellationToken::new();
    let mut receivers = subscribe_all(service, &token, topics, devices);

    for batch in &batches {
        let response = service.sync(ctx, batch).await?;
        tracing::info!(
            device_id = %batch.device_id,
            processed = response.summary.records_processed,
            failed = response.summary.records_failed,
            "Batch ingested"
        );
        service.check_overstays().await?;

        for receiver in &mut receivers {
            while let Ok(event) = receiver.try_recv() {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    token.cancel();
    service.flush().await;

    let metrics = service.hub_metrics();
    tracing::info!(
        batches = batches.len(),
        published = metrics.published,
        delivered = metrics.delivered,
        dropped = metrics.dropped,
        "Ingest finished"
    );
    Ok(())
}

fn subscribe_all(
    service: &SyncService,
    token: &CancellationToken,
    topics: &[TopicArg],
    devices: &[String],
) -> Vec<mpsc::Receiver<DomainEvent>> {
    let topics = if topics.is_empty() {
        TopicArg::ALL
    } else {
        topics
    };

    topics
        .iter()
        .map(|topic| Channel::Topic((*topic).into()))
        .chain(devices.iter().cloned().map(Channel::Device))
        .map(|channel| service.subscribe(token.clone(), channel))
        .collect()
}
