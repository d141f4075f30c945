//! Service configuration.
//!
//! Settings come from an optional JSON file and are then overridden by
//! `ESTATE_SYNC_*` environment variables. Unknown file keys are rejected.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::DEFAULT_SUBSCRIBER_BUFFER;
use crate::util::{compact_text, normalize_text_option};

pub const ENV_DB_PATH: &str = "ESTATE_SYNC_DB_PATH";
pub const ENV_SUBSCRIBER_BUFFER: &str = "ESTATE_SYNC_SUBSCRIBER_BUFFER";
pub const ENV_NOTIFICATIONS: &str = "ESTATE_SYNC_NOTIFICATIONS";
pub const ENV_OVERSTAY_MINUTES: &str = "ESTATE_SYNC_OVERSTAY_MINUTES";

/// A vehicle inside longer than this is overstaying
pub const DEFAULT_OVERSTAY_MINUTES: u32 = 8 * 60;

/// Runtime settings of a `SyncService`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ServiceConfig {
    /// Database file; `None` lets the caller pick a platform default
    pub db_path: Option<PathBuf>,
    /// Per-subscriber event queue depth
    pub subscriber_buffer: usize,
    /// Persist notifications for record events
    pub notifications_enabled: bool,
    /// Minutes after entry before a vehicle still inside raises an alert
    pub overstay_minutes: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            notifications_enabled: true,
            overstay_minutes: DEFAULT_OVERSTAY_MINUTES,
        }
    }
}

impl ServiceConfig {
    /// Parse a JSON config document
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::InvalidInput(format!("invalid config: {error}")))?;
        config.validate()
    }

    /// Load a JSON config file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path)?;
        Self::from_json(&payload)
    }

    /// Apply overrides from the process environment
    pub fn apply_process_env(self) -> Result<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; blank values are ignored
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(path) = read(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = read(ENV_SUBSCRIBER_BUFFER) {
            self.subscriber_buffer = raw.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "{ENV_SUBSCRIBER_BUFFER} must be a positive integer, got '{}'",
                    compact_text(&raw)
                ))
            })?;
        }
        if let Some(raw) = read(ENV_NOTIFICATIONS) {
            self.notifications_enabled = parse_flag(&raw).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{ENV_NOTIFICATIONS} must be true or false, got '{}'",
                    compact_text(&raw)
                ))
            })?;
        }

        if let Some(raw) = read(ENV_OVERSTAY_MINUTES) {
            self.overstay_minutes = raw.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "{ENV_OVERSTAY_MINUTES} must be a positive integer, got '{}'",
                    compact_text(&raw)
                ))
            })?;
        }

        self.validate()
    }

    /// Overstay threshold in milliseconds
    pub fn overstay_threshold_ms(&self) -> i64 {
        i64::from(self.overstay_minutes) * 60_000
    }

    fn validate(self) -> Result<Self> {
        if self.subscriber_buffer == 0 {
            return Err(Error::InvalidInput(
                "subscriber_buffer must be greater than zero".into(),
            ));
        }
        if self.overstay_minutes == 0 {
            return Err(Error::InvalidInput(
                "overstay_minutes must be greater than zero".into(),
            ));
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
