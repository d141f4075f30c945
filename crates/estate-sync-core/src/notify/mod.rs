//! Idempotent notification fan-out.
//!
//! A notification is identified by its type and the entity it is about. Each
//! recipient holds at most one notification per identity, no matter how many
//! times the triggering event is replayed.

mod policy;

pub use policy::{allowed_roles, dispatch_overstay, dispatch_record_event};

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::{AssignedActor, NotificationRepository, SqliteNotificationRepository};
use crate::error::Result;
use crate::models::{NotificationDraft, NotificationPriority, NotificationType, Role};
use rusqlite::Connection;

/// A potential recipient with the role text exactly as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub actor_id: String,
    pub raw_role: String,
}

impl From<AssignedActor> for Candidate {
    fn from(actor: AssignedActor) -> Self {
        Self {
            actor_id: actor.actor_id,
            raw_role: actor.raw_role,
        }
    }
}

/// Rendered content for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

/// The entity a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject<'s> {
    pub kind: NotificationType,
    pub entity_type: &'s str,
    pub entity_id: &'s str,
}

impl Subject<'_> {
    /// Key shared by every recipient's copy of this notification
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.entity_id)
    }
}

/// Per-call fan-out counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyReport {
    pub inserted: usize,
    pub skipped_existing: usize,
    pub skipped_role: usize,
    pub failed: usize,
}

/// Writes notifications at most once per recipient and subject
pub struct NotificationDeduplicator<'a> {
    conn: &'a Connection,
}

impl<'a> NotificationDeduplicator<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Notify every eligible candidate that does not already hold this
    /// notification.
    ///
    /// Candidates whose role does not normalize to one of the type's allowed
    /// roles are skipped. A failed insert is counted and logged but does not
    /// stop the remaining recipients.
    pub fn notify_once<F>(
        &self,
        subject: Subject<'_>,
        candidates: &[Candidate],
        render: F,
    ) -> Result<NotifyReport>
    where
        F: Fn(&Candidate, Role) -> NotificationContent,
    {
        let mut report = NotifyReport::default();
        let allowed = allowed_roles(subject.kind);

        let mut eligible = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match Role::normalize(&candidate.raw_role) {
                Some(role) if allowed.contains(&role) => eligible.push((candidate, role)),
                _ => {
                    tracing::debug!(
                        recipient = %candidate.actor_id,
                        role = %candidate.raw_role,
                        kind = subject.kind.as_str(),
                        "Skipping notification recipient by role"
                    );
                    report.skipped_role += 1;
                }
            }
        }
        if eligible.is_empty() {
            return Ok(report);
        }

        let repo = SqliteNotificationRepository::new(self.conn);
        let ids: Vec<String> = eligible
            .iter()
            .map(|(candidate, _)| candidate.actor_id.clone())
            .collect();
        let existing =
            repo.existing_recipients(subject.kind, subject.entity_type, subject.entity_id, &ids)?;
        let key = subject.idempotency_key();

        for (candidate, role) in eligible {
            if existing.contains(&candidate.actor_id) {
                report.skipped_existing += 1;
                continue;
            }

            let content = render(candidate, role);
            let draft = NotificationDraft {
                idempotency_key: key.clone(),
                kind: subject.kind,
                priority: content.priority,
                title: content.title,
                message: content.message,
                recipient_id: candidate.actor_id.clone(),
                recipient_role: role,
                related_entity_type: subject.entity_type.to_string(),
                related_entity_id: subject.entity_id.to_string(),
                metadata: content.metadata,
            };

            match repo.insert_once(&draft) {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.skipped_existing += 1,
                Err(error) => {
                    tracing::warn!(
                        recipient = %candidate.actor_id,
                        key = %key,
                        %error,
                        "Failed to insert notification"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
