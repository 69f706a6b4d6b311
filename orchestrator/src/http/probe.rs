//! Slot health probing

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use slot_api::HealthPayload;
use tracing::debug;

use crate::errors::SlotError;
use crate::http::client::build_client;
use crate::models::health::HealthResult;
use crate::models::slot::Slot;
use crate::storage::settings::SlotsSettings;

/// Performs a single health check against one slot.
///
/// Ordinary network failures are encoded in the result, never returned as
/// errors.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, slot: Slot, timeout: Duration) -> HealthResult;
}

/// Probes a slot's health endpoint over HTTP
pub struct HttpHealthProbe {
    client: Client,
    slots: SlotsSettings,
}

impl HttpHealthProbe {
    pub fn new(slots: SlotsSettings) -> Result<Self, SlotError> {
        Ok(Self::with_client(build_client()?, slots))
    }

    pub fn with_client(client: Client, slots: SlotsSettings) -> Self {
        Self { client, slots }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, slot: Slot, timeout: Duration) -> HealthResult {
        let started = Instant::now();
        let url = match self.slots.endpoint(slot).health_url() {
            Ok(url) => url,
            Err(e) => return HealthResult::unreachable(slot, e.to_string(), started.elapsed()),
        };

        debug!("GET {} (timeout {:?})", url, timeout);
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", timeout)
                } else {
                    e.to_string()
                };
                return HealthResult::unreachable(slot, reason, started.elapsed());
            }
        };

        let status = response.status();
        let body = response.bytes().await;
        let latency = started.elapsed();
        classify(slot, status, body.ok().as_deref(), latency)
    }
}

/// Classify a health response: non-200 is unhealthy, then the body must parse
/// and report itself healthy.
pub fn classify(slot: Slot, status: StatusCode, body: Option<&[u8]>, latency: Duration) -> HealthResult {
    let payload = body.and_then(|b| serde_json::from_slice::<HealthPayload>(b).ok());

    if status != StatusCode::OK {
        return HealthResult::unhealthy(
            slot,
            status.as_u16(),
            payload,
            Some(format!("health endpoint returned HTTP {}", status.as_u16())),
            latency,
        );
    }

    match payload {
        Some(payload) if payload.is_healthy() => HealthResult::healthy(slot, payload, latency),
        Some(payload) => {
            let error = format!("service reports status {:?}", payload.status);
            HealthResult::unhealthy(slot, status.as_u16(), Some(payload), Some(error), latency)
        }
        None => HealthResult::unhealthy(
            slot,
            status.as_u16(),
            None,
            Some("health body is not a valid health document".to_string()),
            latency,
        ),
    }
}
