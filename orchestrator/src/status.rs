//! Operator status snapshots

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::http::probe::HealthProbe;
use crate::models::deployment::DeploymentRecord;
use crate::models::health::HealthResult;
use crate::models::slot::Slot;
use crate::storage::settings::SlotsSettings;
use crate::storage::state_store::DeploymentStateStore;

/// History entries included in a snapshot
pub const RECENT_HISTORY: usize = 5;

/// One slot as seen right now
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub slot: Slot,
    pub port: u16,
    pub url: String,
    pub live: bool,
    pub health: HealthResult,
}

/// Persisted state combined with fresh probes of both slots
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub live_slot: Slot,
    pub staged_slot: Slot,
    pub last_deployment: Option<DeploymentRecord>,
    pub recent_history: Vec<DeploymentRecord>,
    pub last_updated: DateTime<Utc>,
    pub slots: Vec<SlotStatus>,
}

impl StatusSnapshot {
    pub fn slot(&self, slot: Slot) -> Option<&SlotStatus> {
        self.slots.iter().find(|s| s.slot == slot)
    }
}

/// Read-only view over the state store and the slots
pub struct StatusReporter {
    store: Arc<DeploymentStateStore>,
    probe: Arc<dyn HealthProbe>,
    slots: SlotsSettings,
    probe_timeout: Duration,
}

impl StatusReporter {
    pub fn new(
        store: Arc<DeploymentStateStore>,
        probe: Arc<dyn HealthProbe>,
        slots: SlotsSettings,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            slots,
            probe_timeout,
        }
    }

    /// Probe both slots concurrently
    pub async fn health(&self) -> Vec<HealthResult> {
        join_all(
            Slot::ALL
                .into_iter()
                .map(|slot| self.probe.probe(slot, self.probe_timeout)),
        )
        .await
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.store.load().await;
        let health = self.health().await;

        let slots = health
            .into_iter()
            .map(|health| {
                let endpoint = self.slots.endpoint(health.slot);
                SlotStatus {
                    slot: health.slot,
                    port: endpoint.port,
                    url: endpoint.base_url(),
                    live: health.slot == state.live_slot(),
                    health,
                }
            })
            .collect();

        StatusSnapshot {
            live_slot: state.live_slot(),
            staged_slot: state.staged_slot(),
            last_deployment: state.last_deployment().cloned(),
            recent_history: state.recent_history(RECENT_HISTORY).to_vec(),
            last_updated: state.last_updated(),
            slots,
        }
    }
}

/// How many slots answered healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSummary {
    BothHealthy,
    OneHealthy(Slot),
    NoneHealthy,
}

impl HealthSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a HealthResult>) -> Self {
        let healthy: Vec<Slot> = results
            .into_iter()
            .filter(|r| r.is_healthy())
            .map(|r| r.slot)
            .collect();
        match healthy.as_slice() {
            [] => HealthSummary::NoneHealthy,
            [slot] => HealthSummary::OneHealthy(*slot),
            _ => HealthSummary::BothHealthy,
        }
    }
}

impl fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthSummary::BothHealthy => f.write_str("both slots healthy"),
            HealthSummary::OneHealthy(slot) => write!(f, "one slot healthy ({})", slot),
            HealthSummary::NoneHealthy => f.write_str("no slot healthy"),
        }
    }
}
