//! Finite state machine for a single deployment attempt

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    /// Created, nothing done yet
    Pending,

    /// Removing stale build artifacts
    Cleaning,

    /// Checking the slot can be deployed
    Validating,

    /// Replicating data into the staged slot
    Syncing,

    /// Building the artifact and starting the slot process
    Building,

    /// Waiting for the staged slot to report healthy
    HealthGating,

    /// Pointing traffic at the staged slot
    Switching,

    /// Deployment succeeded
    Done,

    /// Undoing a deployment that failed after the build started
    RollingBack,

    /// Deployment failed
    Failed,
}

impl DeployPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployPhase::Done | DeployPhase::Failed)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployPhase::Pending => "pending",
            DeployPhase::Cleaning => "cleaning",
            DeployPhase::Validating => "validating",
            DeployPhase::Syncing => "syncing",
            DeployPhase::Building => "building",
            DeployPhase::HealthGating => "health_gating",
            DeployPhase::Switching => "switching",
            DeployPhase::Done => "done",
            DeployPhase::RollingBack => "rolling_back",
            DeployPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Start the pipeline
    Begin,

    /// Cleanup finished, successfully or not
    Cleaned,

    /// Slot passed validation
    Validated,

    /// Sync finished or was skipped
    Synced,

    /// Artifact built and process started
    Built,

    /// Staged slot reported healthy
    Healthy,

    /// Traffic now points at the staged slot
    Switched,

    /// Switching was skipped on request
    SwitchSkipped,

    /// The current phase failed
    Fail(String),

    /// Rollback finished
    RolledBack,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    phase: DeployPhase,
    error: Option<String>,
    failed_in: Option<DeployPhase>,
}

impl DeployFsm {
    /// Create a new FSM in pending phase
    pub fn new() -> Self {
        Self {
            phase: DeployPhase::Pending,
            error: None,
            failed_in: None,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> DeployPhase {
        self.phase
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Phase the failure happened in
    pub fn failed_in(&self) -> Option<DeployPhase> {
        self.failed_in
    }

    /// Whether the slot process may have been touched and must be rolled back
    pub fn needs_rollback(&self) -> bool {
        self.phase == DeployPhase::RollingBack
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        use DeployPhase::*;

        let new_phase = match (self.phase, &event) {
            (Pending, DeployEvent::Begin) => Cleaning,
            (Cleaning, DeployEvent::Cleaned) => Validating,
            (Validating, DeployEvent::Validated) => Syncing,
            (Syncing, DeployEvent::Synced) => Building,
            (Building, DeployEvent::Built) => HealthGating,
            (HealthGating, DeployEvent::Healthy) => Switching,
            (Switching, DeployEvent::Switched) => Done,
            (Switching, DeployEvent::SwitchSkipped) => Done,

            // Nothing has been started yet, so there is nothing to undo
            (phase @ (Pending | Cleaning | Validating | Syncing), DeployEvent::Fail(err)) => {
                self.error = Some(err.clone());
                self.failed_in = Some(phase);
                Failed
            }

            (phase @ (Building | HealthGating | Switching), DeployEvent::Fail(err)) => {
                self.error = Some(err.clone());
                self.failed_in = Some(phase);
                RollingBack
            }

            (RollingBack, DeployEvent::RolledBack) => Failed,

            (phase, event) => {
                return Err(format!("Invalid transition from {} on {:?}", phase, event));
            }
        };

        self.phase = new_phase;
        Ok(())
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
