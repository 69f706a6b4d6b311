//! Health probe results

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slot_api::HealthPayload;

use crate::models::slot::Slot;

/// Classification of a single health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unreachable => "unreachable",
        })
    }
}

/// Result of probing one slot. Computed fresh on every probe, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub slot: Slot,
    pub status: HealthStatus,
    pub http_status_code: Option<u16>,
    pub payload: Option<HealthPayload>,
    pub error: Option<String>,

    /// Round-trip time of the probe request
    #[serde(with = "duration_ms")]
    pub latency: Duration,
}

impl HealthResult {
    pub fn healthy(slot: Slot, payload: HealthPayload, latency: Duration) -> Self {
        Self {
            slot,
            status: HealthStatus::Healthy,
            http_status_code: Some(200),
            payload: Some(payload),
            error: None,
            latency,
        }
    }

    pub fn unhealthy(
        slot: Slot,
        http_status_code: u16,
        payload: Option<HealthPayload>,
        error: Option<String>,
        latency: Duration,
    ) -> Self {
        Self {
            slot,
            status: HealthStatus::Unhealthy,
            http_status_code: Some(http_status_code),
            payload,
            error,
            latency,
        }
    }

    pub fn unreachable(slot: Slot, error: impl Into<String>, latency: Duration) -> Self {
        Self {
            slot,
            status: HealthStatus::Unreachable,
            http_status_code: None,
            payload: None,
            error: Some(error.into()),
            latency,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        let mut summary = format!("{} is {}", self.slot, self.status);
        if let Some(code) = self.http_status_code {
            summary.push_str(&format!(" (HTTP {})", code));
        }
        if let Some(error) = &self.error {
            summary.push_str(&format!(": {}", error));
        }
        summary
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
