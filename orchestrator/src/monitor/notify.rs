//! Failback notifications

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::slot::Slot;

pub const AUTOMATED_ROLLBACK: &str = "automated_rollback";
pub const HIGH_ERROR_RATE: &str = "high_error_rate";

/// Record emitted after an automated failback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackNotification {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub from_slot: Slot,
    pub to_slot: Slot,
    pub error_rate: f64,
    pub threshold: f64,
    pub reason: String,
}

impl RollbackNotification {
    pub fn high_error_rate(from_slot: Slot, to_slot: Slot, error_rate: f64, threshold: f64) -> Self {
        Self {
            event: AUTOMATED_ROLLBACK.to_string(),
            timestamp: Utc::now(),
            from_slot,
            to_slot,
            error_rate,
            threshold,
            reason: HIGH_ERROR_RATE.to_string(),
        }
    }
}

/// Delivers failback notifications to operators
#[async_trait]
pub trait RollbackNotifier: Send + Sync {
    async fn notify(&self, notification: &RollbackNotification);
}

/// Emits notifications as structured log events
pub struct LogNotifier;

#[async_trait]
impl RollbackNotifier for LogNotifier {
    async fn notify(&self, notification: &RollbackNotification) {
        match serde_json::to_string(notification) {
            Ok(json) => warn!(
                event = %notification.event,
                from = %notification.from_slot,
                to = %notification.to_slot,
                error_rate = notification.error_rate,
                "Rollback notification: {}",
                json
            ),
            Err(e) => error!("Unable to encode rollback notification: {}", e),
        }
    }
}
