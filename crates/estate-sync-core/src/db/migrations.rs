//! Database migrations

use crate::error::Result;
use rusqlite::{params, Connection};

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, &V1_ORGANIZATION)?;
    }
    if version < 2 {
        apply(conn, 2, &V2_FIELD_RECORDS)?;
    }
    if version < 3 {
        apply(conn, 3, &V3_NOTIFICATIONS)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply one migration atomically and record its version
fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        params![version],
    )?;

    tx.commit()?;
    tracing::info!(version, target = CURRENT_VERSION, "Migrated database");
    Ok(())
}

/// Version 1: organization tree, actors and assignments
const V1_ORGANIZATION: [&str; 11] = [
    "CREATE TABLE IF NOT EXISTS companies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS estates (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL REFERENCES companies(id),
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS divisions (
        id TEXT PRIMARY KEY,
        estate_id TEXT NOT NULL REFERENCES estates(id),
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS blocks (
        id TEXT PRIMARY KEY,
        division_id TEXT NOT NULL REFERENCES divisions(id),
        name TEXT NOT NULL
    )",
    // Role is free text: historical rows may predate the canonical names
    "CREATE TABLE IF NOT EXISTS actors (
        id TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        reports_to TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        deleted_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_actors_reports_to ON actors(reports_to)",
    "CREATE TABLE IF NOT EXISTS assignments (
        actor_id TEXT NOT NULL REFERENCES actors(id),
        node_kind TEXT NOT NULL CHECK (node_kind IN ('company', 'estate', 'division')),
        node_id TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (actor_id, node_kind, node_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_assignments_node ON assignments(node_kind, node_id)",
    "CREATE INDEX IF NOT EXISTS idx_estates_company ON estates(company_id)",
    "CREATE INDEX IF NOT EXISTS idx_divisions_estate ON divisions(estate_id)",
    "CREATE INDEX IF NOT EXISTS idx_blocks_division ON blocks(division_id)",
];

/// Version 2: field records, auxiliary photos and device sync state
const V2_FIELD_RECORDS: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS field_records (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        local_id TEXT,
        device_id TEXT,
        owner_id TEXT NOT NULL,
        company_id TEXT NOT NULL,
        estate_id TEXT,
        division_id TEXT,
        block_id TEXT,
        status TEXT NOT NULL,
        payload TEXT NOT NULL,
        reviewed_by TEXT,
        reviewed_at INTEGER,
        rejection_reason TEXT,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    // Idempotent identity: one server record per (device, local id)
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_field_records_device_local
        ON field_records(device_id, local_id)
        WHERE device_id IS NOT NULL AND local_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_field_records_owner ON field_records(owner_id, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_field_records_division ON field_records(division_id)",
    "CREATE INDEX IF NOT EXISTS idx_field_records_updated ON field_records(updated_at DESC)",
    "CREATE TABLE IF NOT EXISTS record_photos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id TEXT NOT NULL REFERENCES field_records(id) ON DELETE CASCADE,
        mime_type TEXT NOT NULL,
        data BLOB NOT NULL,
        size_bytes INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_record_photos_record ON record_photos(record_id)",
    "CREATE TABLE IF NOT EXISTS device_sync_state (
        device_id TEXT PRIMARY KEY,
        last_sync_at INTEGER NOT NULL,
        last_failed_count INTEGER NOT NULL DEFAULT 0
    )",
];

/// Version 3: notifications with per-recipient idempotency
const V3_NOTIFICATIONS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        idempotency_key TEXT NOT NULL,
        type TEXT NOT NULL,
        priority TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        recipient_id TEXT NOT NULL,
        recipient_role TEXT NOT NULL,
        related_entity_type TEXT NOT NULL,
        related_entity_id TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_recipient_key
        ON notifications(recipient_id, idempotency_key)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_entity
        ON notifications(type, related_entity_type, related_entity_id)",
];
