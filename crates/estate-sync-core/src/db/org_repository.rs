//! Organization directory: company → estate → division → block containment

use crate::error::{Error, Result};
use crate::models::{OrgPath, OrgRefs, OrgTarget};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for organization tree lookups and provisioning
pub trait OrgRepository {
    /// Create or rename a company
    fn upsert_company(&self, id: &str, name: &str) -> Result<()>;

    /// Create or move an estate under a company
    fn upsert_estate(&self, id: &str, company_id: &str, name: &str) -> Result<()>;

    /// Create or move a division under an estate
    fn upsert_division(&self, id: &str, estate_id: &str, name: &str) -> Result<()>;

    /// Create or move a block under a division
    fn upsert_block(&self, id: &str, division_id: &str, name: &str) -> Result<()>;

    /// Expand client references into a full path.
    ///
    /// The most specific reference decides the path; every other supplied
    /// reference must agree with it.
    fn resolve(&self, refs: &OrgRefs) -> Result<OrgPath>;

    /// Full path of a single node, `None` if it does not exist
    fn path_of(&self, target: &OrgTarget) -> Result<Option<OrgPath>>;
}

/// `SQLite` implementation of `OrgRepository`
pub struct SqliteOrgRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOrgRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn block_path(&self, block_id: &str) -> Result<Option<OrgPath>> {
        let path = self
            .conn
            .query_row(
                "SELECT e.company_id, e.id, d.id, b.id
                 FROM blocks b
                 JOIN divisions d ON d.id = b.division_id
                 JOIN estates e ON e.id = d.estate_id
                 WHERE b.id = ?",
                params![block_id],
                Self::parse_path,
            )
            .optional()?;
        Ok(path)
    }

    fn division_path(&self, division_id: &str) -> Result<Option<OrgPath>> {
        let path = self
            .conn
            .query_row(
                "SELECT e.company_id, e.id, d.id, NULL
                 FROM divisions d
                 JOIN estates e ON e.id = d.estate_id
                 WHERE d.id = ?",
                params![division_id],
                Self::parse_path,
            )
            .optional()?;
        Ok(path)
    }

    fn estate_path(&self, estate_id: &str) -> Result<Option<OrgPath>> {
        let path = self
            .conn
            .query_row(
                "SELECT company_id, id, NULL, NULL FROM estates WHERE id = ?",
                params![estate_id],
                Self::parse_path,
            )
            .optional()?;
        Ok(path)
    }

    fn company_path(&self, company_id: &str) -> Result<Option<OrgPath>> {
        let path = self
            .conn
            .query_row(
                "SELECT id, NULL, NULL, NULL FROM companies WHERE id = ?",
                params![company_id],
                Self::parse_path,
            )
            .optional()?;
        Ok(path)
    }

    fn parse_path(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrgPath> {
        Ok(OrgPath {
            company_id: row.get(0)?,
            estate_id: row.get(1)?,
            division_id: row.get(2)?,
            block_id: row.get(3)?,
        })
    }
}

/// Fail when a supplied reference disagrees with the resolved path
fn ensure_consistent(
    level: &str,
    supplied: Option<&String>,
    resolved: Option<&String>,
) -> Result<()> {
    match supplied {
        Some(supplied) if resolved != Some(supplied) => Err(Error::InvalidInput(format!(
            "{level} '{supplied}' does not contain the referenced location"
        ))),
        _ => Ok(()),
    }
}

impl OrgRepository for SqliteOrgRepository<'_> {
    fn upsert_company(&self, id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO companies (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name],
        )?;
        Ok(())
    }

    fn upsert_estate(&self, id: &str, company_id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO estates (id, company_id, name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET company_id = excluded.company_id, name = excluded.name",
            params![id, company_id, name],
        )?;
        Ok(())
    }

    fn upsert_division(&self, id: &str, estate_id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO divisions (id, estate_id, name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET estate_id = excluded.estate_id, name = excluded.name",
            params![id, estate_id, name],
        )?;
        Ok(())
    }

    fn upsert_block(&self, id: &str, division_id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO blocks (id, division_id, name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET division_id = excluded.division_id, name = excluded.name",
            params![id, division_id, name],
        )?;
        Ok(())
    }

    fn resolve(&self, refs: &OrgRefs) -> Result<OrgPath> {
        let refs = refs.normalized();

        let (level, id, path) = if let Some(id) = &refs.block_id {
            ("block", id, self.block_path(id)?)
        } else if let Some(id) = &refs.division_id {
            ("division", id, self.division_path(id)?)
        } else if let Some(id) = &refs.estate_id {
            ("estate", id, self.estate_path(id)?)
        } else if let Some(id) = &refs.company_id {
            ("company", id, self.company_path(id)?)
        } else {
            return Err(Error::InvalidInput(
                "record has no organization reference".into(),
            ));
        };

        let path = path.ok_or_else(|| Error::InvalidInput(format!("unknown {level} '{id}'")))?;

        ensure_consistent("division", refs.division_id.as_ref(), path.division_id.as_ref())?;
        ensure_consistent("estate", refs.estate_id.as_ref(), path.estate_id.as_ref())?;
        ensure_consistent("company", refs.company_id.as_ref(), Some(&path.company_id))?;

        Ok(path)
    }

    fn path_of(&self, target: &OrgTarget) -> Result<Option<OrgPath>> {
        match target {
            OrgTarget::Company(id) => self.company_path(id),
            OrgTarget::Estate(id) => self.estate_path(id),
            OrgTarget::Division(id) => self.division_path(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteOrgRepository::new(db.connection());
        repo.upsert_company("company-a", "Company A").unwrap();
        repo.upsert_company("company-b", "Company B").unwrap();
        repo.upsert_estate("estate-a", "company-a", "Estate A").unwrap();
        repo.upsert_estate("estate-b", "company-b", "Estate B").unwrap();
        repo.upsert_division("division-a", "estate-a", "Division A").unwrap();
        repo.upsert_block("block-a1", "division-a", "Block A1").unwrap();
        db
    }

    #[test]
    fn test_resolve_block_expands_full_path() {
        let db = setup();
        let repo = SqliteOrgRepository::new(db.connection());

        let path = repo
            .resolve(&OrgRefs {
                block_id: Some("block-a1".into()),
                ..OrgRefs::default()
            })
            .unwrap();

        assert_eq!(
            path,
            OrgPath {
                company_id: "company-a".into(),
                estate_id: Some("estate-a".into()),
                division_id: Some("division-a".into()),
                block_id: Some("block-a1".into()),
            }
        );
    }

    #[test]
    fn test_resolve_rejects_inconsistent_refs() {
        let db = setup();
        let repo = SqliteOrgRepository::new(db.connection());

        let err = repo
            .resolve(&OrgRefs {
                company_id: Some("company-b".into()),
                division_id: Some("division-a".into()),
                ..OrgRefs::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_rejects_unknown_and_empty_refs() {
        let db = setup();
        let repo = SqliteOrgRepository::new(db.connection());

        let unknown = repo.resolve(&OrgRefs {
            estate_id: Some("estate-x".into()),
            ..OrgRefs::default()
        });
        assert!(matches!(unknown, Err(Error::InvalidInput(_))));

        let empty = repo.resolve(&OrgRefs {
            estate_id: Some("  ".into()),
            ..OrgRefs::default()
        });
        assert!(matches!(empty, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_path_of_target() {
        let db = setup();
        let repo = SqliteOrgRepository::new(db.connection());

        let path = repo
            .path_of(&OrgTarget::Division("division-a".into()))
            .unwrap()
            .unwrap();
        assert_eq!(path.company_id, "company-a");
        assert_eq!(path.estate_id.as_deref(), Some("estate-a"));

        assert!(repo
            .path_of(&OrgTarget::Estate("missing".into()))
            .unwrap()
            .is_none());
    }
}
