//! Scope resolution: which slice of the organization an actor may touch.
//!
//! Resolution runs in strict priority order and stops at the first non-empty
//! result:
//!
//! 1. Active assignments, read at the single granularity the role prefers.
//! 2. The reports-to hierarchy: the actor's usable subordinates.
//! 3. Nothing: [`Scope::NoAccess`].
//!
//! An explicit [`OrgTarget`] can narrow a resolved scope but never widen it.

use serde::Serialize;

use crate::context::RequestContext;
use crate::db::{
    ActorRepository, AssignmentRepository, OrgRepository, SqliteActorRepository,
    SqliteAssignmentRepository, SqliteOrgRepository,
};
use crate::error::{Error, Result};
use crate::models::{Assignment, NodeKind, OrgPath, OrgTarget, Role};
use rusqlite::Connection;

/// Level at which a scope constrains access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Unrestricted,
    Company,
    Estate,
    Division,
    Actors,
    Nothing,
}

/// Predicate set produced by the resolver.
///
/// Each non-empty list is one predicate. Predicates are AND-ed, ids inside a
/// predicate are OR-ed. Lists are sorted and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub company_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub estate_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub division_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actor_ids: Vec<String>,
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids.dedup();
    ids
}

fn admits(ids: &[String], value: Option<&String>) -> bool {
    ids.is_empty() || value.is_some_and(|value| ids.contains(value))
}

impl ScopeFilter {
    /// Filter with a single organizational predicate
    pub fn for_nodes(kind: NodeKind, ids: Vec<String>) -> Self {
        let ids = sorted(ids);
        match kind {
            NodeKind::Company => Self {
                company_ids: ids,
                ..Self::default()
            },
            NodeKind::Estate => Self {
                estate_ids: ids,
                ..Self::default()
            },
            NodeKind::Division => Self {
                division_ids: ids,
                ..Self::default()
            },
        }
    }

    pub fn for_actors(ids: Vec<String>) -> Self {
        Self {
            actor_ids: sorted(ids),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.company_ids.is_empty()
            && self.estate_ids.is_empty()
            && self.division_ids.is_empty()
            && self.actor_ids.is_empty()
    }

    /// Whether any company, estate or division predicate is set
    pub fn has_org_predicate(&self) -> bool {
        !(self.company_ids.is_empty()
            && self.estate_ids.is_empty()
            && self.division_ids.is_empty())
    }

    /// Whether the organizational predicates admit a path.
    ///
    /// A path that stops above a constrained level fails that level.
    pub fn admits_path(&self, path: &OrgPath) -> bool {
        admits(&self.company_ids, Some(&path.company_id))
            && admits(&self.estate_ids, path.estate_id.as_ref())
            && admits(&self.division_ids, path.division_id.as_ref())
    }

    /// Whether a record at `path` owned by `owner` lies inside the filter
    pub fn covers(&self, path: &OrgPath, owner: &str) -> bool {
        self.admits_path(path) && admits(&self.actor_ids, Some(&owner.to_string()))
    }

    pub fn granularity(&self) -> Granularity {
        if !self.division_ids.is_empty() {
            Granularity::Division
        } else if !self.estate_ids.is_empty() {
            Granularity::Estate
        } else if !self.company_ids.is_empty() {
            Granularity::Company
        } else if !self.actor_ids.is_empty() {
            Granularity::Actors
        } else {
            Granularity::Nothing
        }
    }
}

/// Resolved access scope of an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "filter", rename_all = "snake_case")]
pub enum Scope {
    Unrestricted,
    Restricted(ScopeFilter),
    NoAccess,
}

impl Scope {
    pub const fn has_scope(&self) -> bool {
        !matches!(self, Self::NoAccess)
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Unrestricted => Granularity::Unrestricted,
            Self::Restricted(filter) => filter.granularity(),
            Self::NoAccess => Granularity::Nothing,
        }
    }

    /// Whether `caller` may read or write a record at `path` owned by `owner`.
    ///
    /// The caller's own records satisfy the actor predicate only when an
    /// organizational predicate bounds them. A filter made of actor ids alone
    /// admits every path, so there the owner must be one of those actors.
    pub fn authorizes(&self, path: &OrgPath, owner: &str, caller: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Restricted(filter) if owner == caller && filter.has_org_predicate() => {
                filter.admits_path(path)
            }
            Self::Restricted(filter) => filter.covers(path, owner),
            Self::NoAccess => false,
        }
    }
}

/// Preferred assignment granularities of a role, most preferred first
pub const fn assignment_priority(role: Role) -> &'static [NodeKind] {
    match role {
        Role::FieldSupervisor | Role::Assistant => &[NodeKind::Division, NodeKind::Estate],
        Role::Manager | Role::Security => &[NodeKind::Estate, NodeKind::Division],
        Role::AreaManager | Role::CompanyAdmin => &[NodeKind::Company],
        Role::SuperAdmin => &[],
    }
}

/// Resolves scopes against a database connection
pub struct ScopeResolver<'a> {
    conn: &'a Connection,
}

impl<'a> ScopeResolver<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Resolve the caller's scope, optionally narrowed to one target.
    ///
    /// Storage failures surface as [`Error::ScopeResolution`]; an actor with
    /// nothing assigned and nobody reporting to them gets `Ok(NoAccess)`.
    pub fn resolve(&self, ctx: &RequestContext, target: Option<&OrgTarget>) -> Result<Scope> {
        let wrap = |source: Error| Error::ScopeResolution {
            actor_id: ctx.actor_id.clone(),
            source: Box::new(source),
        };

        let scope = self.resolve_base(ctx).map_err(wrap)?;
        tracing::debug!(
            actor_id = %ctx.actor_id,
            role = %ctx.role,
            granularity = ?scope.granularity(),
            "Resolved scope"
        );

        let Some(target) = target else {
            return Ok(scope);
        };
        if !scope.has_scope() {
            return Ok(scope);
        }

        let target_path = SqliteOrgRepository::new(self.conn)
            .path_of(target)
            .map_err(wrap)?
            .ok_or_else(|| Error::InvalidInput(format!("unknown {target}")))?;

        Self::narrow(scope, target, &target_path)
    }

    fn resolve_base(&self, ctx: &RequestContext) -> Result<Scope> {
        if ctx.role == Role::SuperAdmin {
            return Ok(Scope::Unrestricted);
        }

        let assignments = SqliteAssignmentRepository::new(self.conn).active_for(&ctx.actor_id)?;
        if let Some(filter) = self.from_assignments(ctx.role, &assignments)? {
            return Ok(Scope::Restricted(filter));
        }

        let subordinates = SqliteActorRepository::new(self.conn).subordinates(&ctx.actor_id)?;
        if !subordinates.is_empty() {
            return Ok(Scope::Restricted(ScopeFilter::for_actors(subordinates)));
        }

        Ok(Scope::NoAccess)
    }

    fn from_assignments(
        &self,
        role: Role,
        assignments: &[Assignment],
    ) -> Result<Option<ScopeFilter>> {
        if matches!(role, Role::AreaManager | Role::CompanyAdmin) {
            let companies = self.companies_of(assignments)?;
            return Ok((!companies.is_empty())
                .then(|| ScopeFilter::for_nodes(NodeKind::Company, companies)));
        }

        for &kind in assignment_priority(role) {
            let ids: Vec<String> = assignments
                .iter()
                .filter(|assignment| assignment.kind == kind)
                .map(|assignment| assignment.node_id.clone())
                .collect();
            if !ids.is_empty() {
                return Ok(Some(ScopeFilter::for_nodes(kind, ids)));
            }
        }
        Ok(None)
    }

    /// Companies reachable from any assignment: direct ones plus the
    /// companies containing assigned estates and divisions
    fn companies_of(&self, assignments: &[Assignment]) -> Result<Vec<String>> {
        let org = SqliteOrgRepository::new(self.conn);
        let mut companies = Vec::new();

        for assignment in assignments {
            let target = match assignment.kind {
                NodeKind::Company => {
                    companies.push(assignment.node_id.clone());
                    continue;
                }
                NodeKind::Estate => OrgTarget::Estate(assignment.node_id.clone()),
                NodeKind::Division => OrgTarget::Division(assignment.node_id.clone()),
            };
            match org.path_of(&target)? {
                Some(path) => companies.push(path.company_id),
                None => tracing::debug!(%target, "Assignment points at an unknown node"),
            }
        }

        Ok(companies)
    }

    fn narrow(scope: Scope, target: &OrgTarget, target_path: &OrgPath) -> Result<Scope> {
        let narrowed = ScopeFilter::for_nodes(target.kind(), vec![target.id().to_string()]);

        match scope {
            Scope::Unrestricted => Ok(Scope::Restricted(narrowed)),
            Scope::Restricted(filter) if filter.admits_path(target_path) => {
                Ok(Scope::Restricted(ScopeFilter {
                    actor_ids: filter.actor_ids,
                    ..narrowed
                }))
            }
            Scope::Restricted(_) => Err(Error::AccessDenied(format!(
                "{target} is outside the caller's scope"
            ))),
            Scope::NoAccess => Ok(Scope::NoAccess),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, seeded_db};
    use pretty_assertions::assert_eq;

    fn resolve(actor: &str, role: Role, target: Option<&OrgTarget>) -> Result<Scope> {
        let db = seeded_db();
        ScopeResolver::new(db.connection()).resolve(&ctx(actor, role), target)
    }

    fn restricted(scope: Scope) -> ScopeFilter {
        match scope {
            Scope::Restricted(filter) => filter,
            other => panic!("expected restricted scope, got {other:?}"),
        }
    }

    #[test]
    fn manager_ignores_company_assignment() {
        let filter = restricted(resolve("manager-1", Role::Manager, None).unwrap());
        assert_eq!(
            filter,
            ScopeFilter {
                division_ids: vec!["division-a".into()],
                ..ScopeFilter::default()
            }
        );
    }

    #[test]
    fn manager_prefers_estate() {
        let filter = restricted(resolve("manager-2", Role::Manager, None).unwrap());
        assert_eq!(filter.estate_ids, vec!["estate-a".to_string()]);
        assert!(filter.actor_ids.is_empty());
    }

    #[test]
    fn assistant_prefers_division_and_skips_revoked() {
        let filter = restricted(resolve("asisten-1", Role::Assistant, None).unwrap());
        assert_eq!(filter.granularity(), Granularity::Division);
        assert_eq!(filter.division_ids, vec!["division-a".to_string()]);
    }

    #[test]
    fn area_manager_unions_company_sources() {
        let filter = restricted(resolve("area-1", Role::AreaManager, None).unwrap());
        assert_eq!(
            filter.company_ids,
            vec!["company-a".to_string(), "company-b".to_string()]
        );
    }

    #[test]
    fn super_admin_is_unrestricted() {
        assert_eq!(
            resolve("super-1", Role::SuperAdmin, None).unwrap(),
            Scope::Unrestricted
        );
    }

    #[test]
    fn hierarchy_fallback_lists_subordinates() {
        let filter = restricted(resolve("asisten-2", Role::Assistant, None).unwrap());
        assert_eq!(filter, ScopeFilter::for_actors(vec!["mandor-3".into()]));
    }

    #[test]
    fn lone_assistant_has_no_access() {
        let scope = resolve("asisten-alone", Role::Assistant, None).unwrap();
        assert_eq!(scope, Scope::NoAccess);
        assert!(!scope.has_scope());
    }

    #[test]
    fn repeated_resolution_is_identical() {
        let db = seeded_db();
        let resolver = ScopeResolver::new(db.connection());
        let caller = ctx("area-1", Role::AreaManager);

        let first = resolver.resolve(&caller, None).unwrap();
        for _ in 0..5 {
            assert_eq!(resolver.resolve(&caller, None).unwrap(), first);
        }
    }

    #[test]
    fn explicit_target_narrows() {
        let target = OrgTarget::Division("division-b".into());
        let filter = restricted(resolve("admin-1", Role::CompanyAdmin, Some(&target)).unwrap());
        assert_eq!(filter, ScopeFilter::for_nodes(NodeKind::Division, vec!["division-b".into()]));
    }

    #[test]
    fn explicit_target_never_widens() {
        // Division-scoped manager cannot widen to the whole estate
        let estate = OrgTarget::Estate("estate-a".into());
        assert!(matches!(
            resolve("manager-1", Role::Manager, Some(&estate)),
            Err(Error::AccessDenied(_))
        ));

        let foreign = OrgTarget::Division("division-c".into());
        assert!(matches!(
            resolve("admin-1", Role::CompanyAdmin, Some(&foreign)),
            Err(Error::AccessDenied(_))
        ));
    }

    #[test]
    fn explicit_target_ands_with_actor_predicate() {
        let target = OrgTarget::Division("division-a".into());
        let filter = restricted(resolve("asisten-2", Role::Assistant, Some(&target)).unwrap());
        assert_eq!(filter.actor_ids, vec!["mandor-3".to_string()]);
        assert_eq!(filter.division_ids, vec!["division-a".to_string()]);
    }

    #[test]
    fn explicit_target_ignored_without_scope() {
        let target = OrgTarget::Company("company-a".into());
        assert_eq!(
            resolve("asisten-alone", Role::Assistant, Some(&target)).unwrap(),
            Scope::NoAccess
        );
    }

    #[test]
    fn unknown_target_is_invalid() {
        let target = OrgTarget::Estate("estate-x".into());
        assert!(matches!(
            resolve("super-1", Role::SuperAdmin, Some(&target)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn storage_failure_is_distinct_from_no_access() {
        let db = seeded_db();
        db.connection()
            .execute_batch("DROP TABLE assignments")
            .unwrap();

        let err = ScopeResolver::new(db.connection())
            .resolve(&ctx("manager-1", Role::Manager), None)
            .unwrap_err();
        assert!(matches!(err, Error::ScopeResolution { .. }));
    }

    #[test]
    fn actor_only_scope_does_not_admit_own_records() {
        let scope = Scope::Restricted(ScopeFilter::for_actors(vec!["mandor-3".into()]));
        let path = OrgPath {
            company_id: "company-b".into(),
            estate_id: Some("estate-b".into()),
            division_id: Some("division-b".into()),
            block_id: None,
        };

        assert!(scope.authorizes(&path, "mandor-3", "asisten-2"));
        assert!(!scope.authorizes(&path, "asisten-2", "asisten-2"));
        assert!(!scope.authorizes(&path, "mandor-1", "asisten-2"));
        assert!(!Scope::NoAccess.authorizes(&path, "asisten-2", "asisten-2"));
    }

    #[test]
    fn own_records_need_an_admitted_path() {
        let mut filter = ScopeFilter::for_nodes(NodeKind::Division, vec!["division-a".into()]);
        filter.actor_ids = vec!["mandor-1".into()];
        let scope = Scope::Restricted(filter);
        let inside = OrgPath {
            company_id: "company-a".into(),
            estate_id: Some("estate-a".into()),
            division_id: Some("division-a".into()),
            block_id: None,
        };
        let outside = OrgPath {
            division_id: Some("division-b".into()),
            ..inside.clone()
        };

        assert!(scope.authorizes(&inside, "asisten-1", "asisten-1"));
        assert!(!scope.authorizes(&outside, "asisten-1", "asisten-1"));
        assert!(scope.authorizes(&inside, "mandor-1", "asisten-1"));
        assert!(!scope.authorizes(&inside, "mandor-2", "asisten-1"));
    }

    #[test]
    fn filter_rejects_paths_above_constrained_level() {
        let filter = ScopeFilter::for_nodes(NodeKind::Division, vec!["division-a".into()]);
        let estate_only = OrgPath {
            company_id: "company-a".into(),
            estate_id: Some("estate-a".into()),
            division_id: None,
            block_id: None,
        };
        assert!(!filter.covers(&estate_only, "anyone"));
    }
}
