//! Assignment store: actor ↔ organization node grants

use crate::error::{Error, Result};
use crate::models::{Assignment, NodeKind, OrgPath};
use crate::util::now_millis;
use rusqlite::{params, Connection};

/// An actor assigned somewhere along an organization path, with the role
/// text exactly as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedActor {
    pub actor_id: String,
    pub raw_role: String,
}

/// Trait for assignment storage operations
pub trait AssignmentRepository {
    /// Grant (or re-activate) an assignment
    fn assign(&self, actor_id: &str, kind: NodeKind, node_id: &str) -> Result<()>;

    /// Deactivate an assignment; the row is kept
    fn revoke(&self, actor_id: &str, kind: NodeKind, node_id: &str) -> Result<()>;

    /// Active assignments of an actor, ordered by kind then node
    fn active_for(&self, actor_id: &str) -> Result<Vec<Assignment>>;

    /// Active, usable actors holding an active assignment on any node of `path`
    fn assigned_over(&self, path: &OrgPath) -> Result<Vec<AssignedActor>>;
}

/// `SQLite` implementation of `AssignmentRepository`
pub struct SqliteAssignmentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAssignmentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Assignment> {
        let raw_kind: String = row.get(1)?;
        let kind = raw_kind
            .parse::<NodeKind>()
            .map_err(|error| super::conversion_error(1, error))?;

        Ok(Assignment {
            actor_id: row.get(0)?,
            kind,
            node_id: row.get(2)?,
            is_active: row.get::<_, i32>(3)? != 0,
        })
    }
}

impl AssignmentRepository for SqliteAssignmentRepository<'_> {
    fn assign(&self, actor_id: &str, kind: NodeKind, node_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO assignments (actor_id, node_kind, node_id, is_active, updated_at)
             VALUES (?, ?, ?, 1, ?)
             ON CONFLICT(actor_id, node_kind, node_id) DO UPDATE SET
                is_active = 1,
                updated_at = excluded.updated_at",
            params![actor_id, kind.as_str(), node_id, now_millis()],
        )?;
        Ok(())
    }

    fn revoke(&self, actor_id: &str, kind: NodeKind, node_id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE assignments SET is_active = 0, updated_at = ?
             WHERE actor_id = ? AND node_kind = ? AND node_id = ?",
            params![now_millis(), actor_id, kind.as_str(), node_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!(
                "assignment {actor_id} → {kind}:{node_id}"
            )));
        }
        Ok(())
    }

    fn active_for(&self, actor_id: &str) -> Result<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT actor_id, node_kind, node_id, is_active
             FROM assignments
             WHERE actor_id = ? AND is_active = 1
             ORDER BY node_kind, node_id",
        )?;

        let assignments = stmt
            .query_map(params![actor_id], Self::parse_assignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(assignments)
    }

    fn assigned_over(&self, path: &OrgPath) -> Result<Vec<AssignedActor>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT a.id, a.role
             FROM assignments s
             JOIN actors a ON a.id = s.actor_id
             WHERE s.is_active = 1
               AND a.is_active = 1
               AND a.deleted_at IS NULL
               AND (
                    (s.node_kind = 'company' AND s.node_id = ?1)
                 OR (s.node_kind = 'estate' AND s.node_id = ?2)
                 OR (s.node_kind = 'division' AND s.node_id = ?3)
               )
             ORDER BY a.id",
        )?;

        let actors = stmt
            .query_map(
                params![path.company_id, path.estate_id, path.division_id],
                |row| {
                    Ok(AssignedActor {
                        actor_id: row.get(0)?,
                        raw_role: row.get(1)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(actors)
    }
}
