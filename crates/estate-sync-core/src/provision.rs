//! Organization fixture import.
//!
//! Real provisioning lives in an external admin surface. This module loads the
//! same shape from JSON so a local database can be seeded for operators and
//! tests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::db::{
    ActorRepository, AssignmentRepository, OrgRepository, SqliteActorRepository,
    SqliteAssignmentRepository, SqliteOrgRepository,
};
use crate::error::{Error, Result};
use crate::models::{Actor, NodeKind, Role};
use rusqlite::Connection;

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgFixture {
    #[serde(default)]
    pub companies: Vec<CompanyFixture>,
    #[serde(default)]
    pub actors: Vec<ActorFixture>,
    #[serde(default)]
    pub assignments: Vec<AssignmentFixture>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompanyFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub estates: Vec<EstateFixture>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstateFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub divisions: Vec<DivisionFixture>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DivisionFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BlockFixture>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockFixture {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorFixture {
    pub id: String,
    /// Free-text role, normalized on import
    pub role: String,
    #[serde(default)]
    pub reports_to: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentFixture {
    pub actor_id: String,
    pub kind: NodeKind,
    pub node_id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Counts of rows written by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub org_nodes: usize,
    pub actors: usize,
    pub assignments: usize,
}

impl OrgFixture {
    /// Parse a fixture from a JSON string
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read and parse a fixture file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Write the fixture into the database in a single transaction.
    ///
    /// Re-importing the same fixture is a no-op apart from refreshed
    /// assignment timestamps.
    pub fn apply(&self, conn: &Connection) -> Result<ImportSummary> {
        let tx = conn.unchecked_transaction()?;
        let mut summary = ImportSummary::default();

        let org = SqliteOrgRepository::new(&tx);
        for company in &self.companies {
            org.upsert_company(&company.id, &company.name)?;
            summary.org_nodes += 1;
            for estate in &company.estates {
                org.upsert_estate(&estate.id, &company.id, &estate.name)?;
                summary.org_nodes += 1;
                for division in &estate.divisions {
                    org.upsert_division(&division.id, &estate.id, &division.name)?;
                    summary.org_nodes += 1;
                    for block in &division.blocks {
                        org.upsert_block(&block.id, &division.id, &block.name)?;
                        summary.org_nodes += 1;
                    }
                }
            }
        }

        let actors = SqliteActorRepository::new(&tx);
        for fixture in &self.actors {
            let role = fixture.role.parse::<Role>().map_err(|_| {
                Error::InvalidInput(format!(
                    "actor {} has unknown role '{}'",
                    fixture.id, fixture.role
                ))
            })?;
            // Edges are set in a second pass so actors may reference later entries
            actors.upsert(&Actor {
                id: fixture.id.clone(),
                role,
                reports_to: None,
                is_active: fixture.is_active,
                deleted_at: None,
            })?;
            summary.actors += 1;
        }
        for fixture in &self.actors {
            actors.set_reports_to(&fixture.id, fixture.reports_to.as_deref())?;
        }

        let assignments = SqliteAssignmentRepository::new(&tx);
        for fixture in &self.assignments {
            assignments.assign(&fixture.actor_id, fixture.kind, &fixture.node_id)?;
            if !fixture.is_active {
                assignments.revoke(&fixture.actor_id, fixture.kind, &fixture.node_id)?;
            }
            summary.assignments += 1;
        }

        tx.commit()?;
        tracing::info!(
            org_nodes = summary.org_nodes,
            actors = summary.actors,
            assignments = summary.assignments,
            "Imported organization fixture"
        );
        Ok(summary)
    }
}
