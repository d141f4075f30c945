//! Scoped reads: record listings, pull-since, overstays and device status

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::db::{
    RecordFilter, RecordRepository, SqliteRecordRepository, SqliteSyncStateRepository,
    SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    ChangeCursor, DeviceSyncStatus, FieldRecord, OrgTarget, RecordKind, RecordStatus,
    VehicleInside,
};
use crate::scope::{Scope, ScopeResolver};
use crate::util::{normalize_device_id, now_millis};
use rusqlite::Connection;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// A device counts as online this long after its last batch (ms)
pub const ONLINE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Caller-supplied listing parameters, applied inside the caller's scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordQuery {
    /// Narrow the caller's scope to one node
    pub target: Option<OrgTarget>,
    pub kind: Option<RecordKind>,
    pub status: Option<RecordStatus>,
    pub device_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            target: None,
            kind: None,
            status: None,
            device_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Row filter equivalent to a scope, or `None` when the scope admits nothing.
///
/// Actor predicates always include the caller so their own records stay
/// visible.
pub fn record_filter(scope: &Scope, caller: &str) -> Option<RecordFilter> {
    match scope {
        Scope::Unrestricted => Some(RecordFilter::default()),
        Scope::Restricted(filter) => {
            let mut owner_ids = filter.actor_ids.clone();
            if !owner_ids.is_empty() && !owner_ids.iter().any(|id| id == caller) {
                owner_ids.push(caller.to_string());
            }
            Some(RecordFilter {
                company_ids: filter.company_ids.clone(),
                estate_ids: filter.estate_ids.clone(),
                division_ids: filter.division_ids.clone(),
                owner_ids,
                ..RecordFilter::default()
            })
        }
        Scope::NoAccess => None,
    }
}

/// List live records visible to the caller, newest first
pub fn list_records(
    conn: &Connection,
    ctx: &RequestContext,
    query: &RecordQuery,
) -> Result<Vec<FieldRecord>> {
    ctx.authenticate(conn)?;
    let scope = ScopeResolver::new(conn).resolve(ctx, query.target.as_ref())?;
    let Some(mut filter) = record_filter(&scope, &ctx.actor_id) else {
        return Ok(Vec::new());
    };

    filter.kind = query.kind;
    filter.status = query.status;
    filter.device_id = query
        .device_id
        .as_deref()
        .and_then(normalize_device_id);
    filter.limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    filter.offset = query.offset;

    SqliteRecordRepository::new(conn).list(&filter)
}

/// The caller's own records changed after `cursor`, deletions included, so a
/// device can pull server-side changes such as review decisions.
///
/// Pages come oldest first; pass `ChangeCursor::after` of the last record to
/// fetch the next one.
pub fn records_since(
    conn: &Connection,
    ctx: &RequestContext,
    cursor: &ChangeCursor,
    limit: usize,
) -> Result<Vec<FieldRecord>> {
    ctx.authenticate(conn)?;
    let filter = RecordFilter {
        owner_ids: vec![ctx.actor_id.clone()],
        changed_after: Some(*cursor),
        include_deleted: true,
        limit: limit.clamp(1, MAX_PAGE_SIZE),
        ..RecordFilter::default()
    };
    SqliteRecordRepository::new(conn).list(&filter)
}

/// Every vehicle inside longer than `threshold_ms` as of `now`, longest
/// stay first
pub fn overstayed_vehicles(
    conn: &Connection,
    threshold_ms: i64,
    now: i64,
) -> Result<Vec<VehicleInside>> {
    let cutoff = now.saturating_sub(threshold_ms);
    Ok(SqliteRecordRepository::new(conn)
        .open_entries_before(cutoff)?
        .iter()
        .filter_map(|record| VehicleInside::from_entry(record, now))
        .collect())
}

/// The overstays inside the caller's scope
pub fn overstays_for(
    conn: &Connection,
    ctx: &RequestContext,
    threshold_ms: i64,
    now: i64,
) -> Result<Vec<VehicleInside>> {
    ctx.authenticate(conn)?;
    let scope = ScopeResolver::new(conn).resolve(ctx, None)?;
    if !scope.has_scope() {
        return Ok(Vec::new());
    }

    let mut vehicles = overstayed_vehicles(conn, threshold_ms, now)?;
    vehicles.retain(|inside| scope.authorizes(&inside.org, &inside.owner_id, &ctx.actor_id));
    Ok(vehicles)
}

/// Current sync health of a device
pub fn device_sync_status(conn: &Connection, device_id: &str) -> Result<DeviceSyncStatus> {
    let device_id = normalize_device_id(device_id)
        .ok_or_else(|| Error::InvalidInput("device id is required".into()))?;

    let state = SqliteSyncStateRepository::new(conn).get(&device_id)?;
    let records = SqliteRecordRepository::new(conn);
    let pending_count = records.pending_count_for_device(&device_id)?;
    let unique_device_count = records.distinct_device_count()?;

    let now = now_millis();
    Ok(DeviceSyncStatus {
        is_online: state
            .as_ref()
            .is_some_and(|state| now - state.last_sync_at <= ONLINE_WINDOW_MS),
        pending_count,
        failed_count: state.as_ref().map_or(0, |state| state.last_failed_count),
        last_sync_at: state.map(|state| state.last_sync_at),
        unique_device_count,
        device_id,
    })
}
