//! Actor storage and the reports-to hierarchy

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::models::{Actor, Role};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for actor storage and hierarchy traversal
pub trait ActorRepository {
    /// Insert or replace an actor
    fn upsert(&self, actor: &Actor) -> Result<()>;

    /// Get an actor by ID, including inactive and soft-deleted ones
    fn get(&self, id: &str) -> Result<Option<Actor>>;

    /// Set or clear the actor's reports-to edge
    fn set_reports_to(&self, id: &str, reports_to: Option<&str>) -> Result<()>;

    /// Mark an actor inactive without deleting it
    fn deactivate(&self, id: &str) -> Result<()>;

    /// All active, non-deleted subordinates of an actor, direct and transitive.
    ///
    /// Traversal is breadth-first, terminates on cycles and never walks
    /// through an inactive or deleted actor. The root is never included.
    fn subordinates(&self, id: &str) -> Result<Vec<String>>;
}

/// `SQLite` implementation of `ActorRepository`
pub struct SqliteActorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteActorRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an actor from a database row
    fn parse_actor(row: &rusqlite::Row<'_>) -> rusqlite::Result<Actor> {
        let raw_role: String = row.get(1)?;
        let role = Role::normalize(&raw_role).ok_or_else(|| {
            super::conversion_error(1, Error::InvalidInput(format!("unknown role '{raw_role}'")))
        })?;

        Ok(Actor {
            id: row.get(0)?,
            role,
            reports_to: row.get(2)?,
            is_active: row.get::<_, i32>(3)? != 0,
            deleted_at: row.get(4)?,
        })
    }

    /// Direct reports of an actor with their usability flag
    fn direct_reports(&self, id: &str) -> Result<Vec<(String, bool)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, is_active = 1 AND deleted_at IS NULL
             FROM actors
             WHERE reports_to = ?
             ORDER BY id",
        )?;

        let reports = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(reports)
    }
}

impl ActorRepository for SqliteActorRepository<'_> {
    fn upsert(&self, actor: &Actor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO actors (id, role, reports_to, is_active, deleted_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                role = excluded.role,
                reports_to = excluded.reports_to,
                is_active = excluded.is_active,
                deleted_at = excluded.deleted_at",
            params![
                actor.id,
                actor.role.as_str(),
                actor.reports_to,
                i32::from(actor.is_active),
                actor.deleted_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Actor>> {
        let actor = self
            .conn
            .query_row(
                "SELECT id, role, reports_to, is_active, deleted_at FROM actors WHERE id = ?",
                params![id],
                Self::parse_actor,
            )
            .optional()?;
        Ok(actor)
    }

    fn set_reports_to(&self, id: &str, reports_to: Option<&str>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE actors SET reports_to = ? WHERE id = ?",
            params![reports_to, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("actor {id}")));
        }
        Ok(())
    }

    fn deactivate(&self, id: &str) -> Result<()> {
        let rows = self
            .conn
            .execute("UPDATE actors SET is_active = 0 WHERE id = ?", params![id])?;

        if rows == 0 {
            return Err(Error::NotFound(format!("actor {id}")));
        }
        Ok(())
    }

    fn subordinates(&self, id: &str) -> Result<Vec<String>> {
        let mut visited = HashSet::from([id.to_string()]);
        let mut queue = VecDeque::from([id.to_string()]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for (report, usable) in self.direct_reports(&current)? {
                if !usable || !visited.insert(report.clone()) {
                    continue;
                }
                found.push(report.clone());
                queue.push_back(report);
            }
        }

        found.sort();
        Ok(found)
    }
}
