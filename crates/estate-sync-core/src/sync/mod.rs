//! Reconciliation of client-authored record batches.
//!
//! Each record in a batch is resolved to an identity (explicit server id,
//! then the device's local id, then a fresh create), authorized against the
//! caller's scope, checked for conflicts and written in its own transaction.
//! Conflicts resolve server-wins. A failing record never aborts the batch.

mod photo;

pub use photo::{decode_data_uri, DecodedPhoto, MAX_PHOTO_BYTES};

use std::collections::HashMap;

use crate::context::RequestContext;
use crate::db::{
    OrgRepository, RecordRepository, SqliteOrgRepository, SqliteRecordRepository,
    SqliteSyncStateRepository, SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::events::{RecordChange, RecordEvent};
use crate::models::{
    DeviceSyncStatus, FieldRecord, OrgPath, OrgRefs, RecordDelta, RecordId, RecordKind,
    RecordPayload, RecordStatus, SyncBatch, SyncOperation, SyncOutcome, SyncResponse,
};
use crate::query;
use crate::scope::{Scope, ScopeResolver};
use crate::util::{next_write_timestamp, normalize_device_id, now_millis};
use rusqlite::Connection;

/// Everything a processed batch produced
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Synchronous answer for the submitting device
    pub response: SyncResponse,
    /// One event per created or updated record, in first-seen order
    pub events: Vec<RecordEvent>,
    /// Device status after the batch; `None` if it could not be computed
    pub device_status: Option<DeviceSyncStatus>,
}

/// What happened to one record
enum Applied {
    Created(FieldRecord),
    Updated(FieldRecord),
    Deleted(RecordId),
    Conflict(RecordId),
}

/// A per-record failure, carrying the server id when one was resolved
struct Failure {
    server_id: Option<RecordId>,
    error: Error,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            server_id: None,
            error,
        }
    }
}

impl From<rusqlite::Error> for Failure {
    fn from(error: rusqlite::Error) -> Self {
        Error::from(error).into()
    }
}

/// A duplicate key, as opposed to any other constraint failure
fn is_unique_violation(error: &Error) -> bool {
    matches!(
        error,
        Error::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            )
    )
}

/// Applies sync batches against one database connection
pub struct ReconciliationEngine<'a> {
    conn: &'a Connection,
}

impl<'a> ReconciliationEngine<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Reconcile a batch, returning one outcome per record in input order.
    ///
    /// Fails as a whole only when the caller is unknown or inactive, the
    /// device id is blank, or the caller's scope cannot be resolved.
    pub fn sync_records(&self, ctx: &RequestContext, batch: &SyncBatch) -> Result<SyncReport> {
        ctx.authenticate(self.conn)?;
        let device_id = normalize_device_id(&batch.device_id)
            .ok_or_else(|| Error::InvalidInput("device id is required".into()))?;
        let scope = ScopeResolver::new(self.conn).resolve(ctx, None)?;

        tracing::info!(
            actor_id = %ctx.actor_id,
            device_id = %device_id,
            records = batch.records.len(),
            "Sync batch started"
        );

        let mut results = Vec::with_capacity(batch.records.len());
        let mut events: Vec<RecordEvent> = Vec::new();
        let mut event_index: HashMap<RecordId, usize> = HashMap::new();

        for delta in &batch.records {
            let local_id = delta.local_id.trim();
            match self.apply(ctx, &scope, &device_id, delta) {
                Ok(Applied::Created(record)) => {
                    results.push(SyncOutcome::persisted(local_id, record.id));
                    push_event(&mut events, &mut event_index, record, RecordChange::Created);
                }
                Ok(Applied::Updated(record)) => {
                    results.push(SyncOutcome::persisted(local_id, record.id));
                    push_event(&mut events, &mut event_index, record, RecordChange::Updated);
                }
                Ok(Applied::Deleted(id)) => {
                    results.push(SyncOutcome::persisted(local_id, id));
                }
                Ok(Applied::Conflict(id)) => {
                    tracing::info!(
                        %local_id,
                        server_id = %id,
                        "Sync conflict, server version kept"
                    );
                    results.push(SyncOutcome::conflict(local_id, id));
                }
                Err(Failure { server_id, error }) => {
                    tracing::warn!(%local_id, %error, "Sync record failed");
                    results.push(SyncOutcome::failed(local_id, server_id, &error));
                }
            }
        }

        let response = SyncResponse::new(results, now_millis());
        let device_status = self.finish_batch(&device_id, &response);

        tracing::info!(
            device_id = %device_id,
            processed = response.summary.records_processed,
            successful = response.summary.records_successful,
            failed = response.summary.records_failed,
            conflicts = response.summary.conflicts_detected,
            "Sync batch finished"
        );

        Ok(SyncReport {
            response,
            events,
            device_status,
        })
    }

    /// Record device bookkeeping. Failures here never fail the batch.
    fn finish_batch(&self, device_id: &str, response: &SyncResponse) -> Option<DeviceSyncStatus> {
        let recorded = SqliteSyncStateRepository::new(self.conn).record_batch(
            device_id,
            response.server_timestamp,
            response.summary.records_failed,
        );
        if let Err(error) = recorded {
            tracing::warn!(%device_id, %error, "Failed to record device sync state");
            return None;
        }

        match query::device_sync_status(self.conn, device_id) {
            Ok(status) => Some(status),
            Err(error) => {
                tracing::warn!(%device_id, %error, "Failed to compute device sync status");
                None
            }
        }
    }

    fn apply(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        device_id: &str,
        delta: &RecordDelta,
    ) -> std::result::Result<Applied, Failure> {
        let local_id = delta.local_id.trim();
        if local_id.is_empty() {
            return Err(Error::InvalidInput("local id is required".into()).into());
        }

        let records = SqliteRecordRepository::new(self.conn);
        let existing = match delta.server_id {
            Some(id) => Some(
                records
                    .get(&id)?
                    .ok_or_else(|| Error::NotFound(format!("record {id}")))?,
            ),
            None => records.find_by_device_local(device_id, local_id)?,
        };

        match existing {
            Some(existing) => self.apply_existing(ctx, scope, delta, existing),
            None => self.create_or_redirect(ctx, scope, device_id, local_id, delta),
        }
    }

    /// Create the record, or update the row another writer created for the
    /// same (device, local id) between the lookup and the insert
    fn create_or_redirect(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        device_id: &str,
        local_id: &str,
        delta: &RecordDelta,
    ) -> std::result::Result<Applied, Failure> {
        match self.apply_new(ctx, scope, device_id, local_id, delta) {
            Err(error) if is_unique_violation(&error) => {
                let existing = SqliteRecordRepository::new(self.conn)
                    .find_by_device_local(device_id, local_id)?
                    .ok_or(error)?;
                tracing::debug!(
                    %device_id,
                    %local_id,
                    id = %existing.id,
                    "Create redirected to existing record"
                );
                self.apply_existing(ctx, scope, delta, existing)
            }
            other => other.map_err(Failure::from),
        }
    }

    fn apply_new(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        device_id: &str,
        local_id: &str,
        delta: &RecordDelta,
    ) -> Result<Applied> {
        if delta.operation == SyncOperation::Delete {
            return Err(Error::NotFound(format!("no record for local id {local_id}")));
        }
        delta.payload.validate()?;

        let org = self.resolve_path(&delta.org, &delta.payload)?;
        if !scope.authorizes(&org, &ctx.actor_id, &ctx.actor_id) {
            return Err(Error::AccessDenied(
                "record location is outside the caller's scope".into(),
            ));
        }

        let now = now_millis();
        let record = FieldRecord {
            id: RecordId::new(),
            local_id: Some(local_id.to_string()),
            device_id: Some(device_id.to_string()),
            owner_id: ctx.actor_id.clone(),
            org,
            status: RecordStatus::Pending,
            payload: delta.payload.clone(),
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        let tx = self.conn.unchecked_transaction()?;
        let repo = SqliteRecordRepository::new(&tx);
        repo.insert(&record)?;
        attach_photo(&repo, &record.id, delta.photo.as_deref(), now)?;
        tx.commit()?;

        Ok(Applied::Created(record))
    }

    fn apply_existing(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        delta: &RecordDelta,
        existing: FieldRecord,
    ) -> std::result::Result<Applied, Failure> {
        let id = existing.id;
        self.reconcile(ctx, scope, delta, existing)
            .map_err(|error| Failure {
                server_id: Some(id),
                error,
            })
    }

    fn reconcile(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        delta: &RecordDelta,
        existing: FieldRecord,
    ) -> Result<Applied> {
        let id = existing.id;
        if !scope.authorizes(&existing.org, &existing.owner_id, &ctx.actor_id) {
            return Err(Error::AccessDenied(format!(
                "record {id} is outside the caller's scope"
            )));
        }
        if existing.kind() != delta.payload.kind() {
            return Err(Error::InvalidInput(format!(
                "record {id} is a {} record",
                existing.kind().as_str()
            )));
        }

        // A retried create carries no view of the server row; its own creation
        // time is the version it last saw
        let client_view = delta.last_updated.unwrap_or(existing.created_at);
        if existing.updated_at > client_view {
            return Ok(Applied::Conflict(id));
        }

        if existing.is_deleted {
            return match delta.operation {
                SyncOperation::Delete => Ok(Applied::Deleted(id)),
                SyncOperation::Create | SyncOperation::Update => {
                    Err(Error::NotFound(format!("record {id} was deleted")))
                }
            };
        }

        let updated_at = next_write_timestamp(existing.updated_at);

        if delta.operation == SyncOperation::Delete {
            let tx = self.conn.unchecked_transaction()?;
            SqliteRecordRepository::new(&tx).soft_delete(&id, updated_at)?;
            tx.commit()?;
            return Ok(Applied::Deleted(id));
        }

        delta.payload.validate()?;
        let org = if delta.org.normalized().is_empty() {
            existing.org.clone()
        } else {
            self.resolve_path(&delta.org, &delta.payload)?
        };
        if !scope.authorizes(&org, &existing.owner_id, &ctx.actor_id) {
            return Err(Error::AccessDenied(
                "record location is outside the caller's scope".into(),
            ));
        }

        let tx = self.conn.unchecked_transaction()?;
        let repo = SqliteRecordRepository::new(&tx);
        repo.update_content(&id, &org, &delta.payload, updated_at)?;
        attach_photo(&repo, &id, delta.photo.as_deref(), updated_at)?;
        tx.commit()?;

        Ok(Applied::Updated(FieldRecord {
            org,
            payload: delta.payload.clone(),
            updated_at,
            ..existing
        }))
    }

    /// Resolve references and check the kind's location requirement
    fn resolve_path(&self, refs: &OrgRefs, payload: &RecordPayload) -> Result<OrgPath> {
        let path = SqliteOrgRepository::new(self.conn).resolve(refs)?;
        match payload.kind() {
            RecordKind::Harvest if path.division_id.is_none() => Err(Error::InvalidInput(
                "harvest records need a block or division".into(),
            )),
            RecordKind::GuestLog if path.estate_id.is_none() => Err(Error::InvalidInput(
                "guest logs need at least an estate".into(),
            )),
            _ => Ok(path),
        }
    }
}

/// Decode and store an embedded photo within the caller's transaction
fn attach_photo(
    repo: &SqliteRecordRepository<'_>,
    id: &RecordId,
    photo: Option<&str>,
    at: i64,
) -> Result<()> {
    let Some(uri) = photo else {
        return Ok(());
    };
    let decoded = decode_data_uri(uri)?;
    repo.insert_photo(id, &decoded.mime_type, &decoded.data, at)
}

/// Keep one event per server id: the first position, the latest state
fn push_event(
    events: &mut Vec<RecordEvent>,
    index: &mut HashMap<RecordId, usize>,
    record: FieldRecord,
    change: RecordChange,
) {
    match index.get(&record.id) {
        Some(&position) => {
            let first_change = events[position].change;
            events[position] = RecordEvent::written(record, first_change);
        }
        None => {
            index.insert(record.id, events.len());
            events.push(RecordEvent::written(record, change));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ActorRepository, SqliteActorRepository};
    use crate::events::Topic;
    use crate::models::{GateIntent, Role, SyncErrorKind};
    use crate::review::{review_record, ReviewDecision};
    use crate::test_support::{ctx, guest_delta, harvest_delta, harvest_payload, seeded_db};
    use pretty_assertions::assert_eq;

    fn batch(device_id: &str, records: Vec<RecordDelta>) -> SyncBatch {
        SyncBatch {
            device_id: device_id.to_string(),
            client_timestamp: 1_700_000_000_000,
            records,
        }
    }

    fn record_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM field_records", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn creates_record_with_resolved_path() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("device-1", vec![harvest_delta("local-1", "block-a1")]),
            )
            .unwrap();

        let outcome = &report.response.results[0];
        assert!(outcome.success);
        assert!(!outcome.conflict_detected);
        let id = outcome.server_id.unwrap();

        let stored = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.owner_id, "mandor-1");
        assert_eq!(stored.org.division_id.as_deref(), Some("division-a"));
        assert_eq!(stored.org.company_id, "company-a");
        assert_eq!(stored.status, RecordStatus::Pending);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].topic, Topic::HarvestCreated);
    }

    #[test]
    fn retried_create_is_idempotent() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);
        let submission = batch("device-1", vec![harvest_delta("local-1", "block-a1")]);

        let first = engine.sync_records(&caller, &submission).unwrap();
        let second = engine.sync_records(&caller, &submission).unwrap();

        assert_eq!(
            first.response.results[0].server_id,
            second.response.results[0].server_id
        );
        assert!(second.response.results[0].success);
        assert_eq!(record_count(db.connection()), 1);
    }

    #[test]
    fn device_id_is_trimmed_for_identity() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);

        let first = engine
            .sync_records(&caller, &batch("device-1", vec![harvest_delta("l", "block-a1")]))
            .unwrap();
        let second = engine
            .sync_records(&caller, &batch(" device-1 ", vec![harvest_delta("l", "block-a1")]))
            .unwrap();

        assert_eq!(
            first.response.results[0].server_id,
            second.response.results[0].server_id
        );
    }

    #[test]
    fn stale_resubmission_after_approval_keeps_server_version() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);

        let created = engine
            .sync_records(&caller, &batch("device-1", vec![harvest_delta("local-1", "block-a1")]))
            .unwrap();
        let id = created.response.results[0].server_id.unwrap();
        let original = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();

        review_record(
            db.connection(),
            &ctx("asisten-1", Role::Assistant),
            &id,
            &ReviewDecision::Approve,
        )
        .unwrap();

        let mut stale = harvest_delta("local-1", "block-a1");
        stale.server_id = Some(id);
        stale.operation = SyncOperation::Update;
        stale.last_updated = Some(original.updated_at);
        stale.payload = harvest_payload(99);

        let report = engine
            .sync_records(&caller, &batch("device-1", vec![stale]))
            .unwrap();
        let outcome = &report.response.results[0];
        assert!(outcome.success);
        assert!(outcome.conflict_detected);
        assert_eq!(outcome.server_id, Some(id));
        assert_eq!(report.response.summary.conflicts_detected, 1);
        assert!(report.events.is_empty());

        let stored = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RecordStatus::Approved);
        assert_eq!(stored.payload, harvest_payload(10));
    }

    #[test]
    fn current_update_applies_and_bumps_timestamp() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);

        let created = engine
            .sync_records(&caller, &batch("device-1", vec![harvest_delta("local-1", "block-a1")]))
            .unwrap();
        let id = created.response.results[0].server_id.unwrap();
        let before = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();

        let mut update = harvest_delta("local-1", "block-b1");
        update.operation = SyncOperation::Update;
        update.last_updated = Some(before.updated_at);
        update.payload = harvest_payload(12);

        // mandor-1 is scoped to division-a; moving to division-b is denied
        let denied = engine
            .sync_records(&caller, &batch("device-1", vec![update.clone()]))
            .unwrap();
        assert_eq!(
            denied.response.results[0].error_kind,
            Some(SyncErrorKind::AccessDenied)
        );
        assert_eq!(denied.response.results[0].server_id, Some(id));

        update.org = OrgRefs::default();
        let report = engine
            .sync_records(&caller, &batch("device-1", vec![update]))
            .unwrap();
        assert!(report.response.results[0].success);
        assert_eq!(report.events[0].change, RecordChange::Updated);

        let after = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.payload, harvest_payload(12));
        assert_eq!(after.org, before.org);
    }

    #[test]
    fn invalid_photo_rolls_back_update() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);

        let created = engine
            .sync_records(&caller, &batch("device-1", vec![harvest_delta("local-1", "block-a1")]))
            .unwrap();
        let id = created.response.results[0].server_id.unwrap();
        let before = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();

        let mut update = harvest_delta("local-1", "block-a1");
        update.last_updated = Some(before.updated_at);
        update.payload = harvest_payload(42);
        update.photo = Some("data:image/png;base64,%%%".into());

        let report = engine
            .sync_records(&caller, &batch("device-1", vec![update]))
            .unwrap();
        let outcome = &report.response.results[0];
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(SyncErrorKind::Validation));
        assert!(report.events.is_empty());

        let after = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn valid_photo_is_stored_with_record() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut delta = harvest_delta("local-1", "block-a1");
        delta.photo = Some("data:image/jpeg;base64,AQID".into());
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("device-1", vec![delta]),
            )
            .unwrap();

        let id = report.response.results[0].server_id.unwrap();
        let photos = SqliteRecordRepository::new(db.connection())
            .photo_count(&id)
            .unwrap();
        assert_eq!(photos, 1);
    }

    #[test]
    fn bad_record_does_not_abort_batch() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut empty_local = harvest_delta("  ", "block-a1");
        empty_local.local_id = "  ".into();
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch(
                    "device-1",
                    vec![
                        harvest_delta("local-1", "block-a1"),
                        empty_local,
                        harvest_delta("local-3", "block-c1"),
                        harvest_delta("local-4", "block-x"),
                        harvest_delta("local-5", "block-a1"),
                    ],
                ),
            )
            .unwrap();

        let kinds: Vec<_> = report
            .response
            .results
            .iter()
            .map(|outcome| outcome.error_kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                Some(SyncErrorKind::Validation),
                Some(SyncErrorKind::AccessDenied),
                Some(SyncErrorKind::Validation),
                None,
            ]
        );
        assert_eq!(report.response.summary.records_processed, 5);
        assert_eq!(report.response.summary.records_successful, 2);
        assert_eq!(report.response.summary.records_failed, 3);
        assert_eq!(report.device_status.unwrap().failed_count, 3);
    }

    #[test]
    fn one_event_per_server_id() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut again = harvest_delta("local-1", "block-a1");
        again.payload = harvest_payload(11);
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch(
                    "device-1",
                    vec![harvest_delta("local-1", "block-a1"), again],
                ),
            )
            .unwrap();

        assert_eq!(report.response.summary.records_successful, 2);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].change, RecordChange::Created);
        assert_eq!(report.events[0].record.payload, harvest_payload(11));
    }

    #[test]
    fn delete_is_soft_and_emits_nothing() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("satpam-1", Role::Security);

        let created = engine
            .sync_records(
                &caller,
                &batch("post-1", vec![guest_delta("g-1", "estate-a", GateIntent::Entry)]),
            )
            .unwrap();
        assert_eq!(created.events[0].topic, Topic::VehicleEntry);
        let id = created.response.results[0].server_id.unwrap();
        let stored = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();

        let mut delete = guest_delta("g-1", "estate-a", GateIntent::Entry);
        delete.operation = SyncOperation::Delete;
        delete.last_updated = Some(stored.updated_at);
        let report = engine
            .sync_records(&caller, &batch("post-1", vec![delete]))
            .unwrap();

        assert!(report.response.results[0].success);
        assert!(report.events.is_empty());
        let deleted = SqliteRecordRepository::new(db.connection())
            .get(&id)
            .unwrap()
            .unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(record_count(db.connection()), 1);
    }

    #[test]
    fn delete_of_unknown_record_is_not_found() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut delete = harvest_delta("never-synced", "block-a1");
        delete.operation = SyncOperation::Delete;
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("device-1", vec![delete]),
            )
            .unwrap();
        assert_eq!(
            report.response.results[0].error_kind,
            Some(SyncErrorKind::NotFound)
        );
    }

    #[test]
    fn unknown_server_id_is_not_found() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut delta = harvest_delta("local-1", "block-a1");
        delta.server_id = Some(RecordId::new());
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("device-1", vec![delta]),
            )
            .unwrap();
        assert_eq!(
            report.response.results[0].error_kind,
            Some(SyncErrorKind::NotFound)
        );
        assert_eq!(record_count(db.connection()), 0);
    }

    #[test]
    fn guest_log_requires_estate() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let mut delta = guest_delta("g-1", "estate-a", GateIntent::Entry);
        delta.org = OrgRefs {
            company_id: Some("company-a".into()),
            ..OrgRefs::default()
        };
        let report = engine
            .sync_records(&ctx("satpam-1", Role::Security), &batch("post-1", vec![delta]))
            .unwrap();
        assert_eq!(
            report.response.results[0].error_kind,
            Some(SyncErrorKind::Validation)
        );
    }

    #[test]
    fn batch_preconditions_fail_whole_batch() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let submission = batch("device-1", vec![harvest_delta("local-1", "block-a1")]);

        assert!(matches!(
            engine.sync_records(&ctx("ghost", Role::FieldSupervisor), &submission),
            Err(Error::Unauthenticated(_))
        ));
        assert!(matches!(
            engine.sync_records(&ctx("retired-1", Role::Manager), &submission),
            Err(Error::Unauthenticated(_))
        ));
        assert!(matches!(
            engine.sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("   ", vec![harvest_delta("local-1", "block-a1")])
            ),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(record_count(db.connection()), 0);
    }

    #[test]
    fn no_access_caller_gets_per_record_denials() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let report = engine
            .sync_records(
                &ctx("asisten-alone", Role::Assistant),
                &batch("device-9", vec![harvest_delta("local-1", "block-a1")]),
            )
            .unwrap();
        assert_eq!(
            report.response.results[0].error_kind,
            Some(SyncErrorKind::AccessDenied)
        );
    }

    #[test]
    fn foreign_device_cannot_touch_out_of_scope_record() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let created = engine
            .sync_records(
                &ctx("mandor-c", Role::FieldSupervisor),
                &batch("device-c", vec![harvest_delta("local-1", "block-c1")]),
            )
            .unwrap();
        let id = created.response.results[0].server_id.unwrap();

        let mut hijack = harvest_delta("local-x", "block-a1");
        hijack.server_id = Some(id);
        hijack.last_updated = Some(i64::MAX);
        let report = engine
            .sync_records(
                &ctx("mandor-1", Role::FieldSupervisor),
                &batch("device-1", vec![hijack]),
            )
            .unwrap();
        assert_eq!(
            report.response.results[0].error_kind,
            Some(SyncErrorKind::AccessDenied)
        );
    }

    #[test]
    fn hierarchy_only_caller_cannot_create_outside_org() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());

        let report = engine
            .sync_records(
                &ctx("asisten-2", Role::Assistant),
                &batch("device-2", vec![harvest_delta("x", "block-c1")]),
            )
            .unwrap();

        let outcome = &report.response.results[0];
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(SyncErrorKind::AccessDenied));
        assert!(report.events.is_empty());
        assert_eq!(record_count(db.connection()), 0);
    }

    #[test]
    fn concurrent_create_redirects_to_existing_row() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);
        let delta = harvest_delta("local-1", "block-a1");

        let first = engine
            .sync_records(&caller, &batch("device-1", vec![delta.clone()]))
            .unwrap();
        let id = first.response.results[0].server_id.unwrap();

        // The row exists before the insert runs, as when another writer wins
        let scope = ScopeResolver::new(db.connection())
            .resolve(&caller, None)
            .unwrap();
        let applied = engine
            .create_or_redirect(&caller, &scope, "device-1", "local-1", &delta)
            .map_err(|failure| failure.error)
            .unwrap();

        match applied {
            Applied::Updated(record) => assert_eq!(record.id, id),
            _ => panic!("expected the existing record to be updated"),
        }
        assert_eq!(record_count(db.connection()), 1);
    }

    #[test]
    fn only_duplicate_keys_count_as_unique_violations() {
        let db = seeded_db();
        let engine = ReconciliationEngine::new(db.connection());
        let caller = ctx("mandor-1", Role::FieldSupervisor);
        let report = engine
            .sync_records(
                &caller,
                &batch("device-1", vec![harvest_delta("local-1", "block-a1")]),
            )
            .unwrap();
        let id = report.response.results[0].server_id.unwrap();
        let repo = SqliteRecordRepository::new(db.connection());
        let stored = repo.get(&id).unwrap().unwrap();

        let duplicate = repo.insert(&stored).unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let orphan_photo = repo
            .insert_photo(&RecordId::new(), "image/png", &[0x89, 0x50], 1)
            .unwrap_err();
        assert!(!is_unique_violation(&orphan_photo));
    }

    #[test]
    fn deactivated_actor_cannot_sync() {
        let db = seeded_db();
        SqliteActorRepository::new(db.connection())
            .deactivate("mandor-1")
            .unwrap();

        let result = ReconciliationEngine::new(db.connection()).sync_records(
            &ctx("mandor-1", Role::FieldSupervisor),
            &batch("device-1", vec![harvest_delta("local-1", "block-a1")]),
        );
        assert!(matches!(result, Err(Error::Unauthenticated(_))));
    }
}
