//! Notification repository

use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::models::{Notification, NotificationDraft, NotificationType};
use crate::util::now_millis;
use super::sql_count;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

/// Trait for notification storage operations
pub trait NotificationRepository {
    /// Recipients among `candidates` that already hold a notification of this
    /// type about this entity
    fn existing_recipients(
        &self,
        kind: NotificationType,
        entity_type: &str,
        entity_id: &str,
        candidates: &[String],
    ) -> Result<HashSet<String>>;

    /// Insert a notification unless the recipient already holds its
    /// idempotency key. Returns whether a row was written.
    fn insert_once(&self, draft: &NotificationDraft) -> Result<bool>;

    /// Notifications for one recipient, newest first
    fn list_for_recipient(&self, recipient_id: &str, limit: usize) -> Result<Vec<Notification>>;
}

/// `SQLite` implementation of `NotificationRepository`
pub struct SqliteNotificationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNotificationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
        let kind: String = row.get(2)?;
        let priority: String = row.get(3)?;
        let role: String = row.get(7)?;
        let metadata: String = row.get(10)?;

        Ok(Notification {
            id: row.get(0)?,
            idempotency_key: row.get(1)?,
            kind: kind
                .parse()
                .map_err(|error| super::conversion_error(2, error))?,
            priority: priority
                .parse()
                .map_err(|error| super::conversion_error(3, error))?,
            title: row.get(4)?,
            message: row.get(5)?,
            recipient_id: row.get(6)?,
            recipient_role: role
                .parse()
                .map_err(|error| super::conversion_error(7, error))?,
            related_entity_type: row.get(8)?,
            related_entity_id: row.get(9)?,
            metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata)
                .map_err(|error| super::conversion_error(10, error.into()))?,
            created_at: row.get(11)?,
        })
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn existing_recipients(
        &self,
        kind: NotificationType,
        entity_type: &str,
        entity_id: &str,
        candidates: &[String],
    ) -> Result<HashSet<String>> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; candidates.len()].join(", ");
        let mut values = vec![
            Value::Text(kind.as_str().to_string()),
            Value::Text(entity_type.to_string()),
            Value::Text(entity_id.to_string()),
        ];
        values.extend(candidates.iter().cloned().map(Value::Text));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT recipient_id FROM notifications
             WHERE type = ? AND related_entity_type = ? AND related_entity_id = ?
               AND recipient_id IN ({placeholders})"
        ))?;

        let existing = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;

        Ok(existing)
    }

    fn insert_once(&self, draft: &NotificationDraft) -> Result<bool> {
        let metadata = serde_json::to_string(&draft.metadata)?;

        let rows = self.conn.execute(
            "INSERT INTO notifications (
                idempotency_key, type, priority, title, message, recipient_id, recipient_role,
                related_entity_type, related_entity_id, metadata, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(recipient_id, idempotency_key) DO NOTHING",
            params![
                draft.idempotency_key,
                draft.kind.as_str(),
                draft.priority.as_str(),
                draft.title,
                draft.message,
                draft.recipient_id,
                draft.recipient_role.as_str(),
                draft.related_entity_type,
                draft.related_entity_id,
                metadata,
                now_millis()
            ],
        )?;

        Ok(rows > 0)
    }

    fn list_for_recipient(&self, recipient_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, idempotency_key, type, priority, title, message, recipient_id,
                    recipient_role, related_entity_type, related_entity_id, metadata, created_at
             FROM notifications
             WHERE recipient_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )?;

        let notifications = stmt
            .query_map(
                params![recipient_id, sql_count(limit)],
                Self::parse_notification,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NotificationPriority, Role};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn draft(recipient: &str) -> NotificationDraft {
        NotificationDraft {
            idempotency_key: "HARVEST_APPROVAL_NEEDED:record-1".into(),
            kind: NotificationType::HarvestApprovalNeeded,
            priority: NotificationPriority::High,
            title: "Harvest awaiting approval".into(),
            message: "10 bunches from NIK-001".into(),
            recipient_id: recipient.into(),
            recipient_role: Role::Assistant,
            related_entity_type: "HARVEST_RECORD".into(),
            related_entity_id: "record-1".into(),
            metadata: BTreeMap::from([("divisionId".to_string(), "division-a".to_string())]),
        }
    }

    #[test]
    fn test_insert_once_is_idempotent() {
        let db = setup();
        let repo = SqliteNotificationRepository::new(db.connection());

        assert!(repo.insert_once(&draft("asisten-1")).unwrap());
        assert!(!repo.insert_once(&draft("asisten-1")).unwrap());
        assert!(repo.insert_once(&draft("manager-1")).unwrap());

        let listed = repo.list_for_recipient("asisten-1", 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, NotificationType::HarvestApprovalNeeded);
        assert_eq!(listed[0].metadata["divisionId"], "division-a");
    }

    #[test]
    fn test_unbounded_limit_lists_everything() {
        let db = setup();
        let repo = SqliteNotificationRepository::new(db.connection());
        repo.insert_once(&draft("asisten-1")).unwrap();

        let listed = repo.list_for_recipient("asisten-1", usize::MAX).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_existing_recipients() {
        let db = setup();
        let repo = SqliteNotificationRepository::new(db.connection());

        repo.insert_once(&draft("asisten-1")).unwrap();

        let existing = repo
            .existing_recipients(
                NotificationType::HarvestApprovalNeeded,
                "HARVEST_RECORD",
                "record-1",
                &["asisten-1".to_string(), "manager-1".to_string()],
            )
            .unwrap();
        assert_eq!(existing, HashSet::from(["asisten-1".to_string()]));

        let none = repo
            .existing_recipients(
                NotificationType::HarvestApproved,
                "HARVEST_RECORD",
                "record-1",
                &["asisten-1".to_string()],
            )
            .unwrap();
        assert!(none.is_empty());
    }
}
