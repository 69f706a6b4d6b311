//! Durable deployment state

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::SlotError;
use crate::filesys::file::File;
use crate::models::deployment::{DeploymentRecord, DeploymentState};
use crate::models::slot::Slot;

/// Owner of the persisted [`DeploymentState`].
///
/// Every mutation is a read-modify-write of the whole document performed
/// under an in-process lock, and every save is an atomic file replacement.
/// Callers re-read through the store rather than caching a state value.
#[derive(Debug)]
pub struct DeploymentStateStore {
    file: File,
    write_lock: Mutex<()>,
}

impl DeploymentStateStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: Mutex::new(()),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Read the persisted state without creating defaults.
    ///
    /// `Ok(None)` means no state file exists yet.
    pub async fn read_existing(&self) -> Result<Option<DeploymentState>, SlotError> {
        if !self.file.exists().await {
            return Ok(None);
        }
        let state = self
            .file
            .read_json::<DeploymentState>()
            .await
            .map_err(|e| {
                SlotError::StateError(format!(
                    "Unable to parse {}: {}",
                    self.file.path().display(),
                    e
                ))
            })?;
        Ok(Some(state))
    }

    /// Load the state, creating and persisting defaults when absent.
    ///
    /// A corrupt file is logged and replaced by defaults in memory; it is
    /// overwritten on the next save.
    pub async fn load(&self) -> DeploymentState {
        match self.read_existing().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!(
                    "No deployment state at {}, creating defaults",
                    self.file.path().display()
                );
                let state = DeploymentState::default();
                self.save(&state).await;
                state
            }
            Err(e) => {
                warn!("Deployment state is unreadable, falling back to defaults: {}", e);
                DeploymentState::default()
            }
        }
    }

    /// Atomically rewrite the state file.
    ///
    /// Returns whether the write landed. A failed write is logged and the
    /// caller's in-memory value stays authoritative.
    pub async fn save(&self, state: &DeploymentState) -> bool {
        match self.file.write_json(state).await {
            Ok(()) => {
                debug!(
                    live = %state.live_slot(),
                    history = state.history().len(),
                    "Saved deployment state"
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to save deployment state to {}: {}",
                    self.file.path().display(),
                    e
                );
                false
            }
        }
    }

    /// Append a record to the history and persist the successor state
    pub async fn append_record(&self, record: DeploymentRecord) -> DeploymentState {
        let _guard = self.write_lock.lock().await;
        let state = self.load().await.with_record(record);
        self.save(&state).await;
        state
    }

    /// Make `slot` live and persist the successor state
    pub async fn promote(&self, slot: Slot) -> DeploymentState {
        let _guard = self.write_lock.lock().await;
        let state = self.load().await.with_live_slot(slot);
        self.save(&state).await;
        state
    }
}
