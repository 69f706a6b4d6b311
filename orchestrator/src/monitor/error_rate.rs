//! Error rate estimation for the live slot

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::http::probe::HealthProbe;
use crate::models::health::{HealthResult, HealthStatus};
use crate::models::slot::Slot;
use crate::storage::settings::MonitorSettings;

/// One error rate estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRateSample {
    pub slot: Slot,

    /// Estimated error rate in [0, 1]
    pub rate: f64,

    /// What drove the estimate
    pub reason: String,
}

/// Source of the live slot's error rate
#[async_trait]
pub trait ErrorRateEstimator: Send + Sync {
    async fn estimate(&self, slot: Slot) -> ErrorRateSample;
}

/// Derives an error rate from a single health probe
pub struct HealthErrorRateEstimator {
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    slow_response: Duration,
    nominal_rate: f64,
}

impl HealthErrorRateEstimator {
    pub fn new(probe: Arc<dyn HealthProbe>, settings: &MonitorSettings) -> Self {
        Self {
            probe,
            probe_timeout: settings.probe_timeout(),
            slow_response: settings.slow_response(),
            nominal_rate: settings.nominal_error_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl ErrorRateEstimator for HealthErrorRateEstimator {
    async fn estimate(&self, slot: Slot) -> ErrorRateSample {
        let health = self.probe.probe(slot, self.probe_timeout).await;
        let (rate, reason) = rate_from_health(&health, self.slow_response, self.nominal_rate);
        ErrorRateSample {
            slot,
            rate,
            reason,
        }
    }
}

/// Map a probe result onto an error rate.
///
/// | signal                          | rate    |
/// |---------------------------------|---------|
/// | unreachable or non-200          | 1.0     |
/// | self-reported unhealthy         | 0.8     |
/// | database disconnected           | 0.6     |
/// | slower than `slow_response`     | 0.3     |
/// | otherwise                       | nominal |
pub fn rate_from_health(health: &HealthResult, slow_response: Duration, nominal: f64) -> (f64, String) {
    let reachable_ok =
        health.status != HealthStatus::Unreachable && health.http_status_code == Some(200);
    if !reachable_ok {
        return (1.0, health.summary());
    }
    if !health.is_healthy() {
        return (0.8, health.summary());
    }
    if health
        .payload
        .as_ref()
        .is_some_and(|payload| payload.database_disconnected())
    {
        return (0.6, format!("{} reports a disconnected database", health.slot));
    }
    if health.latency > slow_response {
        return (
            0.3,
            format!("{} answered in {:?}", health.slot, health.latency),
        );
    }
    (nominal, format!("{} is healthy", health.slot))
}
