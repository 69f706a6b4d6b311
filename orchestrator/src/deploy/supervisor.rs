//! Slot process supervision

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::SlotError;
use crate::filesys::file::File;
use crate::models::slot::Slot;
use crate::shell::ShellCommand;
use crate::storage::layout::{render, ProjectLayout};
use crate::storage::settings::{SlotsSettings, SupervisorSettings};

/// How a start request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The supervisor (re)started the slot process
    Started,
    /// No supervisor is available, the operator must start the process
    ManualStartRequired { reason: String },
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOutcome::Started => f.write_str("started"),
            StartOutcome::ManualStartRequired { reason } => {
                write!(f, "manual start required ({})", reason)
            }
        }
    }
}

/// Starts and stops the service bound to a slot's port
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Start or restart the slot's process
    async fn start(&self, slot: Slot) -> Result<StartOutcome, SlotError>;

    /// Stop the slot's process
    async fn stop(&self, slot: Slot) -> Result<(), SlotError>;
}

/// pm2 ecosystem document
#[derive(Debug, Serialize)]
struct Ecosystem {
    apps: Vec<EcosystemApp>,
}

#[derive(Debug, Serialize)]
struct EcosystemApp {
    name: String,
    script: PathBuf,
    cwd: PathBuf,
    instances: u32,
    autorestart: bool,
    env: BTreeMap<String, String>,
}

/// Runs slot processes under pm2
pub struct Pm2Supervisor {
    settings: SupervisorSettings,
    slots: SlotsSettings,
    layout: ProjectLayout,
    slot_dir: String,
}

impl Pm2Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        slots: SlotsSettings,
        layout: ProjectLayout,
        slot_dir: String,
    ) -> Self {
        Self {
            settings,
            slots,
            layout,
            slot_dir,
        }
    }

    fn service_name(&self, slot: Slot) -> String {
        render(&self.settings.service_name, slot, self.slots.endpoint(slot).port)
    }

    fn ecosystem(&self, slot: Slot) -> Ecosystem {
        let port = self.slots.endpoint(slot).port;
        let name = self.service_name(slot);

        let mut env: BTreeMap<String, String> = self
            .settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), render(v, slot, port)))
            .collect();
        env.insert("PORT".to_string(), port.to_string());
        env.insert("APP_ENVIRONMENT".to_string(), slot.to_string());
        env.insert("SERVICE_NAME".to_string(), name.clone());

        Ecosystem {
            apps: vec![EcosystemApp {
                name,
                script: self.layout.resolve(render(&self.settings.script, slot, port)),
                cwd: self.layout.resolve(render(&self.settings.cwd, slot, port)),
                instances: 1,
                autorestart: true,
                env,
            }],
        }
    }

    /// Copy the slot's `env` file to `.env` so the service picks it up
    async fn install_env_file(&self, slot: Slot) -> Result<(), SlotError> {
        let slot_dir = self.layout.resolve_for(&self.slot_dir, slot);
        let template = File::new(slot_dir.join("env"));
        if template.exists().await {
            template.copy_to(&File::new(slot_dir.join(".env"))).await?;
            debug!("Installed {} environment file", slot);
        }
        Ok(())
    }

    async fn pm2_available(&self) -> Result<(), String> {
        ShellCommand::new("pm2 --version").run().await.map(|_| ())
    }
}

#[async_trait]
impl ProcessSupervisor for Pm2Supervisor {
    async fn start(&self, slot: Slot) -> Result<StartOutcome, SlotError> {
        self.install_env_file(slot).await?;

        if let Err(e) = self.pm2_available().await {
            warn!("pm2 is not available, start the {} slot manually: {}", slot, e);
            return Ok(StartOutcome::ManualStartRequired { reason: e });
        }

        let slot_dir = self.layout.resolve_for(&self.slot_dir, slot);
        let ecosystem_file = File::new(slot_dir.join("ecosystem.config.json"));
        ecosystem_file.write_json(&self.ecosystem(slot)).await?;

        let name = self.service_name(slot);
        if let Err(e) = ShellCommand::new(format!("pm2 delete {}", name)).run().await {
            debug!("No previous {} process to delete: {}", name, e);
        }

        ShellCommand::new(format!(
            "pm2 start \"{}\"",
            ecosystem_file.path().display()
        ))
        .run()
        .await
        .map_err(SlotError::SupervisorError)?;

        info!(service = %name, port = self.slots.endpoint(slot).port, "Started slot process");
        Ok(StartOutcome::Started)
    }

    async fn stop(&self, slot: Slot) -> Result<(), SlotError> {
        let name = self.service_name(slot);
        ShellCommand::new(format!("pm2 stop {}", name))
            .run()
            .await
            .map_err(SlotError::SupervisorError)?;
        info!(service = %name, "Stopped slot process");
        Ok(())
    }
}

/// Used when no supervisor is configured
pub struct ManualSupervisor;

#[async_trait]
impl ProcessSupervisor for ManualSupervisor {
    async fn start(&self, slot: Slot) -> Result<StartOutcome, SlotError> {
        warn!("No process supervisor configured, start the {} slot manually", slot);
        Ok(StartOutcome::ManualStartRequired {
            reason: "no supervisor configured".to_string(),
        })
    }

    async fn stop(&self, slot: Slot) -> Result<(), SlotError> {
        debug!("No process supervisor configured, not stopping {}", slot);
        Ok(())
    }
}
