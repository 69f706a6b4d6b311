//! Slot artifact builds

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::SlotError;
use crate::filesys::dir::{Dir, MoveStrategy};
use crate::filesys::file::File;
use crate::models::slot::Slot;
use crate::shell::ShellCommand;
use crate::storage::layout::ProjectLayout;
use crate::storage::settings::BuildSettings;
use crate::utils::CooldownOptions;

/// What a build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Slot-specific artifact location, if an artifact was produced
    pub artifact: Option<PathBuf>,

    /// How the artifact was moved into place
    pub moved_by: Option<MoveStrategy>,
}

/// Produces a slot's runnable artifact
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, slot: Slot) -> Result<BuildReport, SlotError>;
}

/// Builds with shell commands and relocates the output per slot
pub struct CommandBuilder {
    settings: BuildSettings,
    layout: ProjectLayout,
    move_attempts: u32,
    move_backoff: CooldownOptions,
}

impl CommandBuilder {
    pub fn new(
        settings: BuildSettings,
        layout: ProjectLayout,
        move_attempts: u32,
        move_backoff: CooldownOptions,
    ) -> Self {
        Self {
            settings,
            layout,
            move_attempts,
            move_backoff,
        }
    }

    async fn install_env_template(&self, slot: Slot) -> Result<(), SlotError> {
        let Some(template) = &self.settings.env_template else {
            return Ok(());
        };
        let source = File::new(self.layout.resolve_for(template, slot));
        if !source.exists().await {
            debug!("No env template at {}", source.path().display());
            return Ok(());
        }
        let target = File::new(self.layout.resolve(&self.settings.env_target));
        source.copy_to(&target).await?;
        info!(
            "Using {} for the {} build",
            source.path().display(),
            slot
        );
        Ok(())
    }

    async fn install_dependencies(&self, work_dir: &Dir) -> Result<(), SlotError> {
        let Some(install) = &self.settings.install_command else {
            return Ok(());
        };
        if work_dir.subdir("node_modules").exists().await {
            return Ok(());
        }
        info!("Installing build dependencies in {}", work_dir.path().display());
        ShellCommand::new(install.clone())
            .current_dir(work_dir.path())
            .run()
            .await
            .map_err(SlotError::BuildError)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactBuilder for CommandBuilder {
    async fn build(&self, slot: Slot) -> Result<BuildReport, SlotError> {
        let work_dir = Dir::new(self.layout.resolve_for(&self.settings.work_dir, slot));
        let output = Dir::new(self.layout.resolve_for(&self.settings.output_dir, slot));
        let artifact = Dir::new(self.layout.resolve_for(&self.settings.artifact_dir, slot));

        let Some(command) = &self.settings.command else {
            debug!("No build command configured for {}", slot);
            return Ok(BuildReport {
                artifact: None,
                moved_by: None,
            });
        };
        if !work_dir.exists().await {
            return Err(SlotError::BuildError(format!(
                "Build directory {} does not exist",
                work_dir.path().display()
            )));
        }

        self.install_env_template(slot).await?;
        self.install_dependencies(&work_dir).await?;

        info!(slot = %slot, "Building with `{}`", command);
        ShellCommand::new(command.clone())
            .current_dir(work_dir.path())
            .env("APP_ENVIRONMENT", slot.as_str())
            .run()
            .await
            .map_err(SlotError::BuildError)?;

        if !output.exists().await {
            return Err(SlotError::BuildError(format!(
                "Build did not produce {}",
                output.path().display()
            )));
        }

        let strategy = output
            .move_to(&artifact, self.move_attempts, &self.move_backoff)
            .await
            .map_err(|e| {
                SlotError::BuildError(format!(
                    "Unable to move {} to {}: {}",
                    output.path().display(),
                    artifact.path().display(),
                    e
                ))
            })?;
        info!(
            "Build artifact for {} at {} ({:?})",
            slot,
            artifact.path().display(),
            strategy
        );

        Ok(BuildReport {
            artifact: Some(artifact.path().to_path_buf()),
            moved_by: Some(strategy),
        })
    }
}
