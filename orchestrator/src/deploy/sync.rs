//! Data sync between slots

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::SlotError;
use crate::models::slot::Slot;
use crate::shell::ShellCommand;

/// Replicates data from the live slot into the staged slot
#[async_trait]
pub trait DataSync: Send + Sync {
    async fn sync(&self, source: Slot, target: Slot) -> Result<(), SlotError>;
}

/// Runs an opaque sync command with `SOURCE_SLOT` and `TARGET_SLOT` set
pub struct CommandDataSync {
    command: Option<String>,
    root_dir: PathBuf,
}

impl CommandDataSync {
    pub fn new(command: Option<String>, root_dir: PathBuf) -> Self {
        Self { command, root_dir }
    }
}

#[async_trait]
impl DataSync for CommandDataSync {
    async fn sync(&self, source: Slot, target: Slot) -> Result<(), SlotError> {
        let Some(command) = &self.command else {
            debug!("No sync command configured");
            return Ok(());
        };

        info!(source = %source, target = %target, "Syncing data");
        ShellCommand::new(command.clone())
            .current_dir(&self.root_dir)
            .env("SOURCE_SLOT", source.as_str())
            .env("TARGET_SLOT", target.as_str())
            .run()
            .await
            .map_err(SlotError::SyncError)?;
        Ok(())
    }
}
