//! Error types for estate-sync-core

use thiserror::Error;

/// Result type alias using estate-sync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in estate-sync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No actor could be resolved for the call
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Actor resolved, but the target lies outside their scope
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Malformed input (record fields, payloads, filters)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage lookup failed while resolving an actor's scope.
    ///
    /// Distinct from a legitimately empty scope, which is not an error.
    #[error("Scope resolution failed for actor {actor_id}: {source}")]
    ScopeResolution {
        actor_id: String,
        #[source]
        source: Box<Error>,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error comes from the storage layer rather than from the caller's input
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Sqlite(_) | Self::Io(_) | Self::ScopeResolution { .. }
        )
    }
}
