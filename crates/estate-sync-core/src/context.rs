//! Caller identity as resolved upstream of this crate

use serde::{Deserialize, Serialize};

use crate::db::{ActorRepository, SqliteActorRepository};
use crate::error::{Error, Result};
use crate::models::{Actor, Role};
use crate::util::normalize_text_option;
use rusqlite::Connection;

/// Authenticated caller of a core operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub actor_id: String,
    pub role: Role,
}

impl RequestContext {
    pub fn new(actor_id: impl Into<String>, role: Role) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }

    /// Build a context from loosely-typed upstream values.
    ///
    /// Missing actor IDs and missing or unrecognized roles are reported as
    /// `Unauthenticated`.
    pub fn from_parts(actor_id: Option<&str>, role: Option<&str>) -> Result<Self> {
        let actor_id = normalize_text_option(actor_id.map(str::to_string))
            .ok_or_else(|| Error::Unauthenticated("missing actor id".into()))?;
        let raw_role = role.ok_or_else(|| Error::Unauthenticated("missing role".into()))?;
        let role = Role::normalize(raw_role)
            .ok_or_else(|| Error::Unauthenticated(format!("unrecognized role '{raw_role}'")))?;

        Ok(Self { actor_id, role })
    }

    /// Load the caller's actor row, failing unless it exists and is usable
    pub fn authenticate(&self, conn: &Connection) -> Result<Actor> {
        let actor = SqliteActorRepository::new(conn)
            .get(&self.actor_id)?
            .ok_or_else(|| Error::Unauthenticated(format!("unknown actor {}", self.actor_id)))?;

        if !actor.is_usable() {
            return Err(Error::Unauthenticated(format!(
                "actor {} is inactive",
                self.actor_id
            )));
        }
        Ok(actor)
    }
}
