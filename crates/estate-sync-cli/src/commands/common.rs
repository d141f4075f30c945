use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use estate_sync_core::config::ServiceConfig;
use estate_sync_core::models::{
    FieldRecord, GateIntent, Notification, RecordPayload, SyncBatch, SyncResponse, VehicleInside,
};
use estate_sync_core::scope::Scope;
use estate_sync_core::{RequestContext, SyncService};
use serde::Serialize;

use crate::error::CliError;

pub const ENV_ACTOR: &str = "ESTATE_SYNC_ACTOR";
pub const ENV_ROLE: &str = "ESTATE_SYNC_ROLE";

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub owner_id: String,
    pub location: String,
    pub summary: String,
    pub updated_at: i64,
    pub relative_time: String,
    pub is_deleted: bool,
}

pub fn load_service_config(config_path: Option<&Path>) -> Result<ServiceConfig, CliError> {
    let config = match config_path {
        Some(path) => ServiceConfig::load_from_path(path)?,
        None => ServiceConfig::default(),
    };
    Ok(config.apply_process_env()?)
}

/// Flag, then config file or `ESTATE_SYNC_DB_PATH`, then the platform data dir
pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &ServiceConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("estate-sync")
        .join("estate-sync.db")
}

pub fn open_service(
    cli_db_path: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<SyncService, CliError> {
    let config = load_service_config(config_path)?;
    let db_path = resolve_db_path(cli_db_path, &config);
    Ok(SyncService::open(ServiceConfig {
        db_path: Some(db_path),
        ..config
    })?)
}

pub fn resolve_context(
    actor: Option<String>,
    role: Option<String>,
) -> Result<RequestContext, CliError> {
    resolve_context_with(actor, role, |key| env::var(key).ok())
}

pub fn resolve_context_with(
    actor: Option<String>,
    role: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RequestContext, CliError> {
    let actor = actor.or_else(|| lookup(ENV_ACTOR));
    let role = role.or_else(|| lookup(ENV_ROLE));
    Ok(RequestContext::from_parts(actor.as_deref(), role.as_deref())?)
}

/// Read a file, or piped stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(CliError::EmptyInput);
            }
            let mut buffer = String::new();
            stdin.lock().read_to_string(&mut buffer)?;
            buffer
        }
    };

    if raw.trim().is_empty() {
        Err(CliError::EmptyInput)
    } else {
        Ok(raw)
    }
}

/// Parse newline-delimited batches, skipping blank lines
pub fn parse_batch_lines(input: &str) -> Result<Vec<SyncBatch>, CliError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|error| CliError::InvalidBatchLine {
                line: index + 1,
                message: error.to_string(),
            })
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

/// Most specific organization node of a record
pub fn record_location(record: &FieldRecord) -> &str {
    record
        .org
        .block_id
        .as_deref()
        .or(record.org.division_id.as_deref())
        .or(record.org.estate_id.as_deref())
        .unwrap_or(&record.org.company_id)
}

pub fn record_summary(record: &FieldRecord) -> String {
    match &record.payload {
        RecordPayload::Harvest(harvest) => format!(
            "{} bunches, {:.1} kg by {}",
            harvest.bunch_count, harvest.weight_kg, harvest.worker
        ),
        RecordPayload::GuestLog(guest) => format!(
            "{} {} ({})",
            guest.vehicle_plate,
            match guest.intent {
                GateIntent::Entry => "in",
                GateIntent::Exit => "out",
            },
            guest.driver_name
        ),
    }
}

pub fn record_to_list_item(record: &FieldRecord, now_ms: i64) -> RecordListItem {
    RecordListItem {
        id: record.id.to_string(),
        kind: record.kind().as_str().to_string(),
        status: record.status.as_str().to_string(),
        owner_id: record.owner_id.clone(),
        location: record_location(record).to_string(),
        summary: record_summary(record),
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
        is_deleted: record.is_deleted,
    }
}

pub fn format_record_lines(records: &[FieldRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let deleted = if record.is_deleted { "  (deleted)" } else { "" };
            format!(
                "{short_id:<13}  {:<9}  {:<8}  {:<12}  {:<12}  {:<10}  {}{deleted}",
                record.kind().as_str(),
                record.status.as_str(),
                record.owner_id,
                record_location(record),
                format_relative_time(record.updated_at, now_ms),
                record_summary(record),
            )
        })
        .collect()
}

pub fn format_outcome_lines(response: &SyncResponse) -> Vec<String> {
    let mut lines: Vec<String> = response
        .results
        .iter()
        .map(|outcome| {
            let server_id = outcome
                .server_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let state = match (outcome.success, outcome.conflict_detected) {
                (true, true) => "conflict".to_string(),
                (true, false) => "ok".to_string(),
                (false, _) => format!(
                    "failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            };
            format!("{:<16}  {server_id:<36}  {state}", outcome.local_id)
        })
        .collect();

    let summary = &response.summary;
    lines.push(format!(
        "{} processed, {} ok, {} failed, {} conflicts",
        summary.records_processed,
        summary.records_successful,
        summary.records_failed,
        summary.conflicts_detected
    ));
    lines
}

pub fn format_notification_lines(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .map(|notification| {
            format!(
                "{}  {:<8}  {}: {}",
                format_timestamp(notification.created_at),
                notification.priority.as_str(),
                notification.title,
                notification.message
            )
        })
        .collect()
}

pub fn format_overstay_lines(vehicles: &[VehicleInside]) -> Vec<String> {
    vehicles
        .iter()
        .map(|inside| {
            let place = inside
                .org
                .estate_id
                .as_deref()
                .unwrap_or(&inside.org.company_id);
            format!(
                "{:<12}  {:<16}  {place:<12}  {:>3}h {:02}m  since {}",
                inside.vehicle_plate,
                inside.driver_name,
                inside.duration_minutes / 60,
                inside.duration_minutes % 60,
                format_timestamp(inside.entry_time)
            )
        })
        .collect()
}

pub fn format_scope_lines(scope: &Scope) -> Vec<String> {
    match scope {
        Scope::Unrestricted => vec!["unrestricted".to_string()],
        Scope::NoAccess => vec!["no access".to_string()],
        Scope::Restricted(filter) => {
            let predicates = [
                ("companies", &filter.company_ids),
                ("estates", &filter.estate_ids),
                ("divisions", &filter.division_ids),
                ("actors", &filter.actor_ids),
            ];
            predicates
                .into_iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(label, ids)| format!("{label}: {}", ids.join(", ")))
                .collect()
        }
    }
}
