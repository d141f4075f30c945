//! Who hears about which record event

use std::collections::BTreeMap;

use super::{Candidate, NotificationContent, NotificationDeduplicator, NotifyReport, Subject};
use crate::db::{
    ActorRepository, AssignmentRepository, SqliteActorRepository, SqliteAssignmentRepository,
};
use crate::error::Result;
use crate::events::{RecordEvent, Topic};
use crate::models::{
    Actor, FieldRecord, NotificationPriority, NotificationType, OrgPath, RecordKind,
    RecordPayload, Role, VehicleInside,
};
use rusqlite::Connection;

const REVIEWERS: &[Role] = &[Role::Assistant, Role::Manager];
const GATE_WATCHERS: &[Role] = &[Role::Manager, Role::AreaManager];

/// Roles that may receive a notification type
pub const fn allowed_roles(kind: NotificationType) -> &'static [Role] {
    match kind {
        NotificationType::HarvestApprovalNeeded => REVIEWERS,
        NotificationType::HarvestApproved | NotificationType::HarvestRejected => &Role::ALL,
        NotificationType::GateCheckCreated
        | NotificationType::GateCheckCompleted
        | NotificationType::GateOverstayAlert => GATE_WATCHERS,
    }
}

/// Notify the people a record event concerns.
///
/// - a new harvest goes to reviewers assigned over its division
/// - a review decision goes back to the record's owner
/// - a gate check goes to managers assigned over its estate
///
/// An update shares its record's idempotency key with the original create,
/// so replays and edits never notify anyone twice. Returns `None` for topics
/// that carry no notification.
pub fn dispatch_record_event(
    conn: &Connection,
    event: &RecordEvent,
) -> Result<Option<NotifyReport>> {
    let record = &event.record;
    let (kind, candidates) = match event.topic {
        Topic::HarvestCreated => (
            NotificationType::HarvestApprovalNeeded,
            assigned_over(conn, &record.org)?,
        ),
        Topic::HarvestApproved => (NotificationType::HarvestApproved, owner_of(conn, record)?),
        Topic::HarvestRejected => (NotificationType::HarvestRejected, owner_of(conn, record)?),
        Topic::VehicleEntry | Topic::VehicleExit => {
            let estate_level = OrgPath {
                division_id: None,
                block_id: None,
                ..record.org.clone()
            };
            let kind = if event.topic == Topic::VehicleEntry {
                NotificationType::GateCheckCreated
            } else {
                NotificationType::GateCheckCompleted
            };
            (kind, assigned_over(conn, &estate_level)?)
        }
        Topic::VehicleOverstay | Topic::DeviceSyncStatus => return Ok(None),
    };

    // The author never needs to hear about their own submission
    let candidates: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| {
            candidate.actor_id != record.owner_id
                || matches!(
                    kind,
                    NotificationType::HarvestApproved | NotificationType::HarvestRejected
                )
        })
        .collect();

    let entity_id = record.id.to_string();
    let subject = Subject {
        kind,
        entity_type: record.kind().entity_type(),
        entity_id: &entity_id,
    };
    let report = NotificationDeduplicator::new(conn)
        .notify_once(subject, &candidates, |_, _| render(kind, record))?;

    tracing::debug!(
        key = %subject.idempotency_key(),
        inserted = report.inserted,
        skipped_existing = report.skipped_existing,
        skipped_role = report.skipped_role,
        failed = report.failed,
        "Notifications dispatched"
    );
    Ok(Some(report))
}

/// Alert managers over the estate about a vehicle still inside, once per
/// entry record
pub fn dispatch_overstay(conn: &Connection, inside: &VehicleInside) -> Result<NotifyReport> {
    let estate_level = OrgPath {
        division_id: None,
        block_id: None,
        ..inside.org.clone()
    };
    let candidates = assigned_over(conn, &estate_level)?;

    let entity_id = inside.record_id.to_string();
    let subject = Subject {
        kind: NotificationType::GateOverstayAlert,
        entity_type: RecordKind::GuestLog.entity_type(),
        entity_id: &entity_id,
    };
    let report = NotificationDeduplicator::new(conn)
        .notify_once(subject, &candidates, |_, _| render_overstay(inside))?;

    tracing::debug!(
        key = %subject.idempotency_key(),
        inserted = report.inserted,
        skipped_existing = report.skipped_existing,
        "Overstay alert dispatched"
    );
    Ok(report)
}

fn render_overstay(inside: &VehicleInside) -> NotificationContent {
    let place = inside
        .org
        .estate_id
        .as_deref()
        .unwrap_or(&inside.org.company_id);
    let mut metadata = BTreeMap::from([
        ("recordId".to_string(), inside.record_id.to_string()),
        ("companyId".to_string(), inside.org.company_id.clone()),
        ("vehiclePlate".to_string(), inside.vehicle_plate.clone()),
        ("entryTime".to_string(), inside.entry_time.to_string()),
        ("durationMinutes".to_string(), inside.duration_minutes.to_string()),
    ]);
    if let Some(estate_id) = &inside.org.estate_id {
        metadata.insert("estateId".to_string(), estate_id.clone());
    }

    NotificationContent {
        priority: NotificationPriority::High,
        title: "Vehicle overstay".to_string(),
        message: format!(
            "{} ({}) has been inside {place} for {}h {}m",
            inside.vehicle_plate,
            inside.driver_name,
            inside.duration_minutes / 60,
            inside.duration_minutes % 60
        ),
        metadata,
    }
}

fn assigned_over(conn: &Connection, path: &OrgPath) -> Result<Vec<Candidate>> {
    Ok(SqliteAssignmentRepository::new(conn)
        .assigned_over(path)?
        .into_iter()
        .map(Candidate::from)
        .collect())
}

fn owner_of(conn: &Connection, record: &FieldRecord) -> Result<Vec<Candidate>> {
    Ok(SqliteActorRepository::new(conn)
        .get(&record.owner_id)?
        .filter(Actor::is_usable)
        .map(|actor| Candidate {
            raw_role: actor.role.as_str().to_string(),
            actor_id: actor.id,
        })
        .into_iter()
        .collect())
}

fn metadata(record: &FieldRecord) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::from([
        ("recordId".to_string(), record.id.to_string()),
        ("ownerId".to_string(), record.owner_id.clone()),
        ("companyId".to_string(), record.org.company_id.clone()),
    ]);
    let optional = [
        ("estateId", &record.org.estate_id),
        ("divisionId", &record.org.division_id),
        ("blockId", &record.org.block_id),
    ];
    metadata.extend(
        optional
            .into_iter()
            .filter_map(|(key, value)| Some((key.to_string(), value.clone()?))),
    );
    metadata
}

fn location(record: &FieldRecord) -> &str {
    record
        .org
        .block_id
        .as_deref()
        .or(record.org.division_id.as_deref())
        .or(record.org.estate_id.as_deref())
        .unwrap_or(&record.org.company_id)
}

fn render(kind: NotificationType, record: &FieldRecord) -> NotificationContent {
    let place = location(record);
    let (priority, title, message) = match (&record.payload, kind) {
        (RecordPayload::Harvest(harvest), NotificationType::HarvestApprovalNeeded) => (
            NotificationPriority::High,
            "Harvest approval needed",
            format!(
                "New harvest from {} at {place} ({:.1} kg) needs approval",
                record.owner_id, harvest.weight_kg
            ),
        ),
        (RecordPayload::Harvest(harvest), NotificationType::HarvestApproved) => (
            NotificationPriority::Medium,
            "Harvest approved",
            format!("Your harvest at {place} ({:.1} kg) was approved", harvest.weight_kg),
        ),
        (RecordPayload::Harvest(harvest), NotificationType::HarvestRejected) => (
            NotificationPriority::High,
            "Harvest rejected",
            format!(
                "Your harvest at {place} ({:.1} kg) was rejected: {}",
                harvest.weight_kg,
                record.rejection_reason.as_deref().unwrap_or("no reason given")
            ),
        ),
        (RecordPayload::GuestLog(guest), NotificationType::GateCheckCreated) => (
            NotificationPriority::Medium,
            "Vehicle entered",
            format!("{} ({}) entered at {place}", guest.vehicle_plate, guest.driver_name),
        ),
        (RecordPayload::GuestLog(guest), _) => (
            NotificationPriority::Low,
            "Vehicle left",
            format!("{} ({}) left {place}", guest.vehicle_plate, guest.driver_name),
        ),
        (RecordPayload::Harvest(_), _) => (
            NotificationPriority::Low,
            "Harvest updated",
            format!("Harvest {} at {place} changed", record.id),
        ),
    };

    NotificationContent {
        priority,
        title: title.to_string(),
        message,
        metadata: metadata(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NotificationRepository, SqliteNotificationRepository};
    use crate::events::RecordChange;
    use crate::models::{GateIntent, RecordDelta, SyncBatch};
    use crate::review::{review_record, ReviewDecision};
    use crate::sync::ReconciliationEngine;
    use crate::test_support::{ctx, guest_delta, harvest_delta, seeded_db};
    use pretty_assertions::assert_eq;

    fn recipients(conn: &Connection, ids: &[&str]) -> Vec<String> {
        let repo = SqliteNotificationRepository::new(conn);
        ids.iter()
            .filter(|id| !repo.list_for_recipient(id, 10).unwrap().is_empty())
            .map(|id| (*id).to_string())
            .collect()
    }

    fn created_event(
        conn: &Connection,
        actor: &str,
        role: Role,
        delta: RecordDelta,
    ) -> RecordEvent {
        let report = ReconciliationEngine::new(conn)
            .sync_records(
                &ctx(actor, role),
                &SyncBatch {
                    device_id: "device-1".into(),
                    client_timestamp: 0,
                    records: vec![delta],
                },
            )
            .unwrap();
        report.events.into_iter().next().unwrap()
    }

    #[test]
    fn new_harvest_notifies_reviewers_over_division() {
        let db = seeded_db();
        let conn = db.connection();
        let delta = harvest_delta("l-1", "block-a1");
        let event = created_event(conn, "mandor-1", Role::FieldSupervisor, delta);
        assert_eq!(event.change, RecordChange::Created);

        let report = dispatch_record_event(conn, &event).unwrap().unwrap();
        // Area managers, company admins and gate staff are not reviewers
        assert_eq!(report.inserted, 3);
        let everyone = [
            "asisten-1", "manager-1", "manager-2", "area-1", "admin-1", "satpam-1", "mandor-1",
        ];
        assert_eq!(
            recipients(conn, &everyone),
            vec!["asisten-1", "manager-1", "manager-2"]
        );

        let replay = dispatch_record_event(conn, &event).unwrap().unwrap();
        assert_eq!(replay.inserted, 0);
        assert_eq!(replay.skipped_existing, 3);
    }

    #[test]
    fn review_decision_notifies_owner() {
        let db = seeded_db();
        let conn = db.connection();
        let delta = harvest_delta("l-1", "block-a1");
        let created = created_event(conn, "mandor-1", Role::FieldSupervisor, delta);

        let (_, event) = review_record(
            conn,
            &ctx("asisten-1", Role::Assistant),
            &created.entity_id,
            &ReviewDecision::Reject {
                reason: "Overripe".into(),
            },
        )
        .unwrap();
        let report = dispatch_record_event(conn, &event).unwrap().unwrap();
        assert_eq!(report.inserted, 1);

        let stored = SqliteNotificationRepository::new(conn)
            .list_for_recipient("mandor-1", 10)
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, NotificationType::HarvestRejected);
        assert!(stored[0].message.contains("Overripe"));
        assert_eq!(stored[0].metadata["divisionId"], "division-a");
    }

    #[test]
    fn gate_check_notifies_estate_managers() {
        let db = seeded_db();
        let conn = db.connection();
        let delta = guest_delta("g-1", "estate-a", GateIntent::Exit);
        let event = created_event(conn, "satpam-1", Role::Security, delta);
        assert_eq!(event.topic, Topic::VehicleExit);

        let report = dispatch_record_event(conn, &event).unwrap().unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(
            recipients(conn, &["manager-2", "area-1", "manager-1", "asisten-1"]),
            vec!["manager-2", "area-1"]
        );

        let stored = SqliteNotificationRepository::new(conn)
            .list_for_recipient("area-1", 10)
            .unwrap();
        assert_eq!(stored[0].kind, NotificationType::GateCheckCompleted);
        assert_eq!(stored[0].related_entity_type, "GATE_CHECK_RECORD");
    }

    #[test]
    fn overstay_alerts_estate_managers_once() {
        let db = seeded_db();
        let conn = db.connection();
        let delta = guest_delta("g-1", "estate-a", GateIntent::Entry);
        let event = created_event(conn, "satpam-1", Role::Security, delta);
        let nine_hours_later = 1_700_000_000_000 + 9 * 3_600_000;
        let inside = VehicleInside::from_entry(&event.record, nine_hours_later).unwrap();

        let report = dispatch_overstay(conn, &inside).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(dispatch_overstay(conn, &inside).unwrap().skipped_existing, 2);

        let stored = SqliteNotificationRepository::new(conn)
            .list_for_recipient("manager-2", 10)
            .unwrap();
        assert_eq!(stored[0].kind, NotificationType::GateOverstayAlert);
        assert_eq!(stored[0].priority, NotificationPriority::High);
        assert!(stored[0].message.contains(&inside.vehicle_plate));
        assert!(stored[0].message.contains("9h 0m"));
    }
}
