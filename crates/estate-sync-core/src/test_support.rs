//! Shared fixtures for unit tests

use crate::context::RequestContext;
use crate::db::Database;
use crate::models::{
    GateIntent, GuestLogPayload, HarvestPayload, OrgRefs, RecordDelta, RecordPayload, Role,
    SyncOperation,
};
use crate::provision::OrgFixture;

/// Two companies; company-a has two divisions under estate-a and an empty estate-a2.
pub const ORG_FIXTURE: &str = r#"
{
  "companies": [
    {
      "id": "company-a",
      "name": "Company A",
      "estates": [
        {
          "id": "estate-a",
          "name": "Estate A",
          "divisions": [
            { "id": "division-a", "name": "Division A", "blocks": [{ "id": "block-a1", "name": "A1" }] },
            { "id": "division-b", "name": "Division B", "blocks": [{ "id": "block-b1", "name": "B1" }] }
          ]
        },
        { "id": "estate-a2", "name": "Estate A2" }
      ]
    },
    {
      "id": "company-b",
      "name": "Company B",
      "estates": [
        {
          "id": "estate-c",
          "name": "Estate C",
          "divisions": [
            { "id": "division-c", "name": "Division C", "blocks": [{ "id": "block-c1", "name": "C1" }] }
          ]
        }
      ]
    }
  ],
  "actors": [
    { "id": "super-1", "role": "SUPER_ADMIN" },
    { "id": "area-1", "role": "AREA_MANAGER" },
    { "id": "admin-1", "role": "COMPANY_ADMIN" },
    { "id": "manager-1", "role": "MANAGER" },
    { "id": "manager-2", "role": "MANAGER" },
    { "id": "asisten-1", "role": "ASISTEN", "reports_to": "manager-2" },
    { "id": "asisten-2", "role": "ASISTEN", "reports_to": "manager-2" },
    { "id": "asisten-alone", "role": "ASISTEN" },
    { "id": "mandor-1", "role": "MANDOR", "reports_to": "asisten-1" },
    { "id": "mandor-2", "role": "MANDOR", "reports_to": "asisten-1" },
    { "id": "mandor-3", "role": "MANDOR", "reports_to": "asisten-2" },
    { "id": "mandor-c", "role": "MANDOR" },
    { "id": "satpam-1", "role": "SATPAM" },
    { "id": "retired-1", "role": "MANAGER", "is_active": false }
  ],
  "assignments": [
    { "actor_id": "area-1", "kind": "company", "node_id": "company-a" },
    { "actor_id": "area-1", "kind": "estate", "node_id": "estate-c" },
    { "actor_id": "admin-1", "kind": "company", "node_id": "company-a" },
    { "actor_id": "manager-1", "kind": "division", "node_id": "division-a" },
    { "actor_id": "manager-1", "kind": "company", "node_id": "company-b" },
    { "actor_id": "manager-2", "kind": "estate", "node_id": "estate-a" },
    { "actor_id": "asisten-1", "kind": "division", "node_id": "division-a" },
    { "actor_id": "asisten-1", "kind": "estate", "node_id": "estate-a", "is_active": false },
    { "actor_id": "mandor-1", "kind": "division", "node_id": "division-a" },
    { "actor_id": "mandor-2", "kind": "division", "node_id": "division-b" },
    { "actor_id": "mandor-c", "kind": "division", "node_id": "division-c" },
    { "actor_id": "satpam-1", "kind": "estate", "node_id": "estate-a" },
    { "actor_id": "retired-1", "kind": "estate", "node_id": "estate-a" }
  ]
}
"#;

/// In-memory database seeded with `ORG_FIXTURE`
pub fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    OrgFixture::from_json(ORG_FIXTURE)
        .unwrap()
        .apply(db.connection())
        .unwrap();
    db
}

pub fn ctx(actor_id: &str, role: Role) -> RequestContext {
    RequestContext::new(actor_id, role)
}

pub fn harvest_payload(bunch_count: u32) -> RecordPayload {
    RecordPayload::Harvest(HarvestPayload {
        harvest_date: 1_700_000_000_000,
        worker: "NIK-001".into(),
        bunch_count,
        weight_kg: f64::from(bunch_count) * 12.5,
        notes: None,
        latitude: None,
        longitude: None,
    })
}

pub fn guest_payload(intent: GateIntent) -> RecordPayload {
    RecordPayload::GuestLog(GuestLogPayload {
        vehicle_plate: "KB 1234 XY".into(),
        driver_name: "Budi".into(),
        intent,
        entry_time: Some(1_700_000_000_000),
        exit_time: None,
        destination: Some("Mill".into()),
        notes: None,
    })
}

/// A create delta for a harvest in the given block
pub fn harvest_delta(local_id: &str, block_id: &str) -> RecordDelta {
    RecordDelta {
        local_id: local_id.to_string(),
        server_id: None,
        operation: SyncOperation::Create,
        last_updated: None,
        org: OrgRefs {
            block_id: Some(block_id.to_string()),
            ..OrgRefs::default()
        },
        payload: harvest_payload(10),
        photo: None,
    }
}

/// A create delta for a gate check at an estate
pub fn guest_delta(local_id: &str, estate_id: &str, intent: GateIntent) -> RecordDelta {
    RecordDelta {
        local_id: local_id.to_string(),
        server_id: None,
        operation: SyncOperation::Create,
        last_updated: None,
        org: OrgRefs {
            estate_id: Some(estate_id.to_string()),
            ..OrgRefs::default()
        },
        payload: guest_payload(intent),
        photo: None,
    }
}
