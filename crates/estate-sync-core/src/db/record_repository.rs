//! Field record repository

use crate::error::{Error, Result};
use crate::models::{
    ChangeCursor, FieldRecord, OrgPath, RecordId, RecordKind, RecordPayload, RecordStatus,
};
use super::sql_count;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const RECORD_COLUMNS: &str = "id, local_id, device_id, owner_id, company_id, estate_id, \
     division_id, block_id, status, payload, reviewed_by, reviewed_at, rejection_reason, \
     is_deleted, created_at, updated_at";

/// Row-level filter for record listings.
///
/// Every non-empty id list is a predicate; predicates are AND-ed and the ids
/// inside one predicate are OR-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub company_ids: Vec<String>,
    pub estate_ids: Vec<String>,
    pub division_ids: Vec<String>,
    pub owner_ids: Vec<String>,
    pub kind: Option<RecordKind>,
    pub status: Option<RecordStatus>,
    pub device_id: Option<String>,
    /// Only changes after this cursor, oldest first
    pub changed_after: Option<ChangeCursor>,
    pub include_deleted: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Trait for field record storage operations
pub trait RecordRepository {
    /// Insert a new record
    fn insert(&self, record: &FieldRecord) -> Result<()>;

    /// Get a record by server ID, soft-deleted ones included
    fn get(&self, id: &RecordId) -> Result<Option<FieldRecord>>;

    /// Find the record a device created under a local ID
    fn find_by_device_local(&self, device_id: &str, local_id: &str)
        -> Result<Option<FieldRecord>>;

    /// Replace location and payload, leaving status and review fields untouched
    fn update_content(
        &self,
        id: &RecordId,
        org: &OrgPath,
        payload: &RecordPayload,
        updated_at: i64,
    ) -> Result<()>;

    /// Soft delete a record
    fn soft_delete(&self, id: &RecordId, updated_at: i64) -> Result<()>;

    /// Record a review decision
    fn set_review(
        &self,
        id: &RecordId,
        status: RecordStatus,
        reviewer_id: &str,
        rejection_reason: Option<&str>,
        reviewed_at: i64,
    ) -> Result<()>;

    /// List records matching a filter, most recently updated first, or
    /// oldest first after a change cursor
    fn list(&self, filter: &RecordFilter) -> Result<Vec<FieldRecord>>;

    /// Live entry gate checks from before `cutoff` (Unix ms) with neither an
    /// exit time nor a later exit of the same plate at the same estate
    fn open_entries_before(&self, cutoff: i64) -> Result<Vec<FieldRecord>>;

    /// Pending, non-deleted records submitted from a device
    fn pending_count_for_device(&self, device_id: &str) -> Result<u32>;

    /// Number of distinct devices that have submitted records
    fn distinct_device_count(&self) -> Result<u32>;

    /// Attach a decoded photo to a record
    fn insert_photo(&self, id: &RecordId, mime_type: &str, data: &[u8], created_at: i64)
        -> Result<()>;

    /// Number of photos attached to a record
    fn photo_count(&self, id: &RecordId) -> Result<u32>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldRecord> {
        let id: String = row.get(0)?;
        let id = id
            .parse::<RecordId>()
            .map_err(|error| super::conversion_error(0, error))?;
        let status: String = row.get(8)?;
        let status = status
            .parse::<RecordStatus>()
            .map_err(|error| super::conversion_error(8, error))?;
        let payload: String = row.get(9)?;
        let payload = serde_json::from_str::<RecordPayload>(&payload)
            .map_err(|error| super::conversion_error(9, Error::from(error)))?;

        Ok(FieldRecord {
            id,
            local_id: row.get(1)?,
            device_id: row.get(2)?,
            owner_id: row.get(3)?,
            org: OrgPath {
                company_id: row.get(4)?,
                estate_id: row.get(5)?,
                division_id: row.get(6)?,
                block_id: row.get(7)?,
            },
            status,
            payload,
            reviewed_by: row.get(10)?,
            reviewed_at: row.get(11)?,
            rejection_reason: row.get(12)?,
            is_deleted: row.get::<_, i32>(13)? != 0,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u32> {
        let count: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

/// Append `column IN (...)` for a non-empty id list
fn push_in(clauses: &mut Vec<String>, values: &mut Vec<Value>, column: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    clauses.push(format!("{column} IN ({placeholders})"));
    values.extend(ids.iter().cloned().map(Value::Text));
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert(&self, record: &FieldRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;

        self.conn.execute(
            "INSERT INTO field_records (
                id, kind, local_id, device_id, owner_id, company_id, estate_id, division_id,
                block_id, status, payload, reviewed_by, reviewed_at, rejection_reason,
                is_deleted, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.kind().as_str(),
                record.local_id,
                record.device_id,
                record.owner_id,
                record.org.company_id,
                record.org.estate_id,
                record.org.division_id,
                record.org.block_id,
                record.status.as_str(),
                payload,
                record.reviewed_by,
                record.reviewed_at,
                record.rejection_reason,
                i32::from(record.is_deleted),
                record.created_at,
                record.updated_at
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: &RecordId) -> Result<Option<FieldRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM field_records WHERE id = ?"),
                params![id.as_str()],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_by_device_local(
        &self,
        device_id: &str,
        local_id: &str,
    ) -> Result<Option<FieldRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM field_records WHERE device_id = ? AND local_id = ?"
                ),
                params![device_id, local_id],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn update_content(
        &self,
        id: &RecordId,
        org: &OrgPath,
        payload: &RecordPayload,
        updated_at: i64,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;

        let rows = self.conn.execute(
            "UPDATE field_records
             SET company_id = ?, estate_id = ?, division_id = ?, block_id = ?,
                 payload = ?, updated_at = ?
             WHERE id = ? AND is_deleted = 0",
            params![
                org.company_id,
                org.estate_id,
                org.division_id,
                org.block_id,
                payload,
                updated_at,
                id.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    fn soft_delete(&self, id: &RecordId, updated_at: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE field_records SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
            params![updated_at, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    fn set_review(
        &self,
        id: &RecordId,
        status: RecordStatus,
        reviewer_id: &str,
        rejection_reason: Option<&str>,
        reviewed_at: i64,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE field_records
             SET status = ?, reviewed_by = ?, reviewed_at = ?, rejection_reason = ?, updated_at = ?
             WHERE id = ? AND is_deleted = 0",
            params![
                status.as_str(),
                reviewer_id,
                reviewed_at,
                rejection_reason,
                reviewed_at,
                id.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<FieldRecord>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if !filter.include_deleted {
            clauses.push("is_deleted = 0".to_string());
        }
        push_in(&mut clauses, &mut values, "company_id", &filter.company_ids);
        push_in(&mut clauses, &mut values, "estate_id", &filter.estate_ids);
        push_in(&mut clauses, &mut values, "division_id", &filter.division_ids);
        push_in(&mut clauses, &mut values, "owner_id", &filter.owner_ids);
        if let Some(kind) = filter.kind {
            clauses.push("kind = ?".to_string());
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(device_id) = &filter.device_id {
            clauses.push("device_id = ?".to_string());
            values.push(Value::Text(device_id.clone()));
        }
        match filter.changed_after {
            Some(ChangeCursor {
                updated_at,
                id: Some(id),
            }) => {
                clauses.push("(updated_at > ? OR (updated_at = ? AND id > ?))".to_string());
                values.push(Value::Integer(updated_at));
                values.push(Value::Integer(updated_at));
                values.push(Value::Text(id.as_str()));
            }
            Some(ChangeCursor { updated_at, id: None }) => {
                clauses.push("updated_at > ?".to_string());
                values.push(Value::Integer(updated_at));
            }
            None => {}
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        // Change feeds page forward from the cursor; listings show newest first
        let order = if filter.changed_after.is_some() {
            "updated_at ASC, id ASC"
        } else {
            "updated_at DESC, id DESC"
        };
        values.push(Value::Integer(sql_count(filter.limit)));
        values.push(Value::Integer(sql_count(filter.offset)));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM field_records {where_clause}
             ORDER BY {order}
             LIMIT ? OFFSET ?"
        ))?;

        let records = stmt
            .query_map(params_from_iter(values.iter()), Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn open_entries_before(&self, cutoff: i64) -> Result<Vec<FieldRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM field_records e
             WHERE e.kind = ?1 AND e.is_deleted = 0
               AND json_extract(e.payload, '$.intent') = 'ENTRY'
               AND json_extract(e.payload, '$.exitTime') IS NULL
               AND COALESCE(json_extract(e.payload, '$.entryTime'), e.created_at) < ?2
               AND NOT EXISTS (
                   SELECT 1 FROM field_records x
                   WHERE x.kind = ?1 AND x.is_deleted = 0
                     AND json_extract(x.payload, '$.intent') = 'EXIT'
                     AND x.estate_id IS e.estate_id
                     AND UPPER(TRIM(json_extract(x.payload, '$.vehiclePlate')))
                         = UPPER(TRIM(json_extract(e.payload, '$.vehiclePlate')))
                     AND COALESCE(json_extract(x.payload, '$.exitTime'), x.created_at)
                         >= COALESCE(json_extract(e.payload, '$.entryTime'), e.created_at)
               )
             ORDER BY COALESCE(json_extract(e.payload, '$.entryTime'), e.created_at), e.id"
        ))?;

        let records = stmt
            .query_map(
                params![RecordKind::GuestLog.as_str(), cutoff],
                Self::parse_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn pending_count_for_device(&self, device_id: &str) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM field_records
             WHERE device_id = ? AND status = 'PENDING' AND is_deleted = 0",
            params![device_id],
        )
    }

    fn distinct_device_count(&self) -> Result<u32> {
        self.count(
            "SELECT COUNT(DISTINCT device_id) FROM field_records WHERE device_id IS NOT NULL",
            [],
        )
    }

    fn insert_photo(
        &self,
        id: &RecordId,
        mime_type: &str,
        data: &[u8],
        created_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO record_photos (record_id, mime_type, data, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![id.as_str(), mime_type, data, sql_count(data.len()), created_at],
        )?;
        Ok(())
    }

    fn photo_count(&self, id: &RecordId) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM record_photos WHERE record_id = ?",
            params![id.as_str()],
        )
    }
}
