//! API models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only self-reported status that counts as healthy
pub const HEALTHY: &str = "healthy";

/// Body of a slot's `GET /health` response.
///
/// Every field is optional on the wire so that a partially conforming backend
/// still parses; classification only looks at `status` and `database`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    /// Self-reported status, `healthy` or `degraded`
    #[serde(default)]
    pub status: String,

    /// Database connectivity as seen by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HealthPayload {
    /// Whether the backend reports itself healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }

    /// Whether the backend reports a disconnected database.
    ///
    /// A missing field is not treated as disconnected.
    pub fn database_disconnected(&self) -> bool {
        matches!(self.database, Some(DatabaseState::Disconnected))
    }

    /// A healthy payload for the given service, used by slot backends and fixtures
    pub fn healthy(service: &str, environment: &str) -> Self {
        Self {
            status: HEALTHY.to_string(),
            database: Some(DatabaseState::Connected),
            service: Some(service.to_string()),
            environment: Some(environment.to_string()),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Database connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseState {
    Connected,
    Disconnected,
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DatabaseState::Connected => "connected",
            DatabaseState::Disconnected => "disconnected",
        })
    }
}
