//! Organization tree and assignment models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::util::normalize_text_option;

/// Level of an organizational node that an actor can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Company,
    Estate,
    Division,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Estate => "estate",
            Self::Division => "division",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(Self::Company),
            "estate" => Ok(Self::Estate),
            "division" => Ok(Self::Division),
            other => Err(Error::InvalidInput(format!("unknown node kind '{other}'"))),
        }
    }
}

/// An explicit, independently revocable grant linking an actor to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub actor_id: String,
    pub node_id: String,
    pub kind: NodeKind,
    pub is_active: bool,
}

/// Full containment path of an organizational reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgPath {
    pub company_id: String,
    pub estate_id: Option<String>,
    pub division_id: Option<String>,
    pub block_id: Option<String>,
}

/// Organizational references as submitted by a client.
///
/// Any subset may be present; the most specific one wins and the rest must
/// agree with the organization tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgRefs {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub estate_id: Option<String>,
    #[serde(default)]
    pub division_id: Option<String>,
    #[serde(default)]
    pub block_id: Option<String>,
}

impl OrgRefs {
    /// Trim every reference and drop blanks
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            company_id: normalize_text_option(self.company_id.clone()),
            estate_id: normalize_text_option(self.estate_id.clone()),
            division_id: normalize_text_option(self.division_id.clone()),
            block_id: normalize_text_option(self.block_id.clone()),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.company_id.is_none()
            && self.estate_id.is_none()
            && self.division_id.is_none()
            && self.block_id.is_none()
    }
}

/// A single organizational target used to narrow a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OrgTarget {
    Company(String),
    Estate(String),
    Division(String),
}

impl OrgTarget {
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Company(_) => NodeKind::Company,
            Self::Estate(_) => NodeKind::Estate,
            Self::Division(_) => NodeKind::Division,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Company(id) | Self::Estate(id) | Self::Division(id) => id,
        }
    }
}

impl fmt::Display for OrgTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
