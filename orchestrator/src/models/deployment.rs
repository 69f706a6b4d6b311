//! Deployment state and history models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::slot::Slot;

/// Maximum number of records kept in the deployment history
pub const HISTORY_LIMIT: usize = 10;

/// Outcome of a deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Failed,
}

/// One deployment attempt. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Version label supplied by the operator
    pub version: String,

    /// Slot the deployment targeted
    #[serde(alias = "environment")]
    pub slot: Slot,

    pub status: RecordStatus,

    pub timestamp: DateTime<Utc>,

    /// Error that failed the deployment, if any
    #[serde(alias = "error", default)]
    pub error_detail: Option<String>,
}

impl DeploymentRecord {
    pub fn success(version: impl Into<String>, slot: Slot) -> Self {
        Self {
            version: version.into(),
            slot,
            status: RecordStatus::Success,
            timestamp: Utc::now(),
            error_detail: None,
        }
    }

    pub fn failed(version: impl Into<String>, slot: Slot, error: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            slot,
            status: RecordStatus::Failed,
            timestamp: Utc::now(),
            error_detail: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// The orchestrator's durable state.
///
/// Values are never mutated in place: every transition consumes the state and
/// returns its successor with `last_updated` refreshed. The staged slot is
/// always the opposite of the live slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PersistedState", into = "PersistedState")]
pub struct DeploymentState {
    live_slot: Slot,
    last_deployment: Option<DeploymentRecord>,
    history: Vec<DeploymentRecord>,
    last_updated: DateTime<Utc>,
}

impl DeploymentState {
    /// A fresh state with the given live slot and empty history
    pub fn new(live_slot: Slot) -> Self {
        Self {
            live_slot,
            last_deployment: None,
            history: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Slot currently receiving production traffic
    pub fn live_slot(&self) -> Slot {
        self.live_slot
    }

    /// Slot targeted by the next deployment
    pub fn staged_slot(&self) -> Slot {
        self.live_slot.other()
    }

    pub fn last_deployment(&self) -> Option<&DeploymentRecord> {
        self.last_deployment.as_ref()
    }

    /// History, oldest first
    pub fn history(&self) -> &[DeploymentRecord] {
        &self.history
    }

    /// The most recent `n` history records, oldest first
    pub fn recent_history(&self, n: usize) -> &[DeploymentRecord] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Successor state with `slot` live and its opposite staged
    pub fn with_live_slot(self, slot: Slot) -> Self {
        Self {
            live_slot: slot,
            last_updated: Utc::now(),
            ..self
        }
    }

    /// Successor state with `record` appended and the history trimmed
    pub fn with_record(mut self, record: DeploymentRecord) -> Self {
        self.history.push(record.clone());
        trim_history(&mut self.history);
        Self {
            last_deployment: Some(record),
            last_updated: Utc::now(),
            ..self
        }
    }

    /// Whether two states agree on everything but `last_updated`
    pub fn same_content(&self, other: &DeploymentState) -> bool {
        self.live_slot == other.live_slot
            && self.last_deployment == other.last_deployment
            && self.history == other.history
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new(Slot::default())
    }
}

fn trim_history(history: &mut Vec<DeploymentRecord>) {
    if history.len() > HISTORY_LIMIT {
        let excess = history.len() - HISTORY_LIMIT;
        history.drain(..excess);
    }
}

/// On-disk shape of [`DeploymentState`]. Accepts the legacy
/// `currentEnvironment`/`nextEnvironment`/`deploymentHistory` field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(alias = "currentEnvironment", default)]
    live_slot: Slot,

    #[serde(alias = "nextEnvironment", default)]
    staged_slot: Option<Slot>,

    #[serde(default)]
    last_deployment: Option<DeploymentRecord>,

    #[serde(alias = "deploymentHistory", default)]
    history: Vec<DeploymentRecord>,

    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,
}

impl From<PersistedState> for DeploymentState {
    fn from(persisted: PersistedState) -> Self {
        if persisted.staged_slot == Some(persisted.live_slot) {
            warn!(
                live = %persisted.live_slot,
                "Persisted state stages the live slot, staging {} instead",
                persisted.live_slot.other()
            );
        }

        let mut history = persisted.history;
        trim_history(&mut history);

        Self {
            live_slot: persisted.live_slot,
            last_deployment: persisted.last_deployment,
            history,
            last_updated: persisted.last_updated,
        }
    }
}

impl From<DeploymentState> for PersistedState {
    fn from(state: DeploymentState) -> Self {
        Self {
            staged_slot: Some(state.staged_slot()),
            live_slot: state.live_slot,
            last_deployment: state.last_deployment,
            history: state.history,
            last_updated: state.last_updated,
        }
    }
}
