//! Actor and role model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of roles an actor can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Captures harvest entries in the field (legacy: MANDOR)
    FieldSupervisor,
    /// Reviews field supervisors' entries (legacy: ASISTEN)
    Assistant,
    Manager,
    AreaManager,
    CompanyAdmin,
    SuperAdmin,
    /// Gate post staff capturing guest logs (legacy: SATPAM)
    Security,
}

impl Role {
    /// All roles, in declaration order
    pub const ALL: [Self; 7] = [
        Self::FieldSupervisor,
        Self::Assistant,
        Self::Manager,
        Self::AreaManager,
        Self::CompanyAdmin,
        Self::SuperAdmin,
        Self::Security,
    ];

    /// Canonical string stored in the database and sent on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FieldSupervisor => "FIELD_SUPERVISOR",
            Self::Assistant => "ASSISTANT",
            Self::Manager => "MANAGER",
            Self::AreaManager => "AREA_MANAGER",
            Self::CompanyAdmin => "COMPANY_ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Security => "SECURITY",
        }
    }

    /// Canonicalize a free-text role string.
    ///
    /// Case and surrounding whitespace are ignored, `-` and spaces are read as
    /// `_`, a `ROLE_` prefix is stripped and legacy aliases are mapped onto
    /// their current variant. Returns `None` for unknown roles.
    pub fn normalize(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_uppercase().replace(['-', ' '], "_");
        let key = upper.strip_prefix("ROLE_").unwrap_or(&upper);

        let role = match key {
            "FIELD_SUPERVISOR" | "MANDOR" => Self::FieldSupervisor,
            "ASSISTANT" | "ASISTEN" => Self::Assistant,
            "MANAGER" => Self::Manager,
            "AREA_MANAGER" | "AREA_AMANAGER" | "AREAMANAGER" => Self::AreaManager,
            "COMPANY_ADMIN" => Self::CompanyAdmin,
            "SUPER_ADMIN" | "SUPERADMIN" => Self::SuperAdmin,
            "SECURITY" | "SATPAM" => Self::Security,
            _ => return None,
        };
        Some(role)
    }

    /// Roles allowed to approve or reject field records
    pub const fn can_review(self) -> bool {
        matches!(
            self,
            Self::Assistant
                | Self::Manager
                | Self::AreaManager
                | Self::CompanyAdmin
                | Self::SuperAdmin
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| Error::InvalidInput(format!("unknown role '{s}'")))
    }
}

/// An actor known to the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    /// Hierarchy edge: the actor this one reports to
    pub reports_to: Option<String>,
    pub is_active: bool,
    /// Soft delete timestamp (Unix ms)
    pub deleted_at: Option<i64>,
}

impl Actor {
    /// Whether the actor may act or be counted as a subordinate
    pub const fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}
