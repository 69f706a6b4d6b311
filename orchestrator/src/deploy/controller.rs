//! Deployment pipeline

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::deploy::builder::ArtifactBuilder;
use crate::deploy::cleanup::{cleanup, CleanupReport};
use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployPhase};
use crate::deploy::supervisor::{ProcessSupervisor, StartOutcome};
use crate::deploy::sync::DataSync;
use crate::errors::SlotError;
use crate::filesys::dir::Dir;
use crate::http::probe::HealthProbe;
use crate::models::deployment::DeploymentRecord;
use crate::models::slot::Slot;
use crate::proxy::switcher::TrafficSwitcher;
use crate::stop::StopListener;
use crate::storage::settings::DeploySettings;
use crate::storage::state_store::DeploymentStateStore;

/// Per-deployment switches
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Do not run the data sync step
    pub skip_sync: bool,

    /// Stop after health gating, leaving traffic where it is
    pub skip_switch: bool,
}

/// Health gating timing
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Delay between probes
    pub interval: Duration,

    /// Total time allowed for the slot to become healthy
    pub timeout: Duration,

    /// Timeout of each probe
    pub probe_timeout: Duration,

    /// Wait after starting the process before the first probe
    pub warmup: Duration,
}

impl GateOptions {
    /// Number of probes that fit in the timeout, at least one
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        (self.timeout.as_millis() / interval).max(1) as u32
    }
}

impl Default for GateOptions {
    fn default() -> Self {
        GateOptions::from(&DeploySettings::default())
    }
}

impl From<&DeploySettings> for GateOptions {
    fn from(settings: &DeploySettings) -> Self {
        Self {
            interval: settings.health_check_interval(),
            timeout: settings.health_check_timeout(),
            probe_timeout: settings.probe_timeout(),
            warmup: settings.warmup(),
        }
    }
}

/// Everything a deployment talks to
pub struct Collaborators {
    pub store: Arc<DeploymentStateStore>,
    pub probe: Arc<dyn HealthProbe>,
    pub switcher: Arc<TrafficSwitcher>,
    pub builder: Arc<dyn ArtifactBuilder>,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub sync: Arc<dyn DataSync>,
}

/// Runs one-shot deployments into a slot
pub struct DeploymentController {
    store: Arc<DeploymentStateStore>,
    probe: Arc<dyn HealthProbe>,
    switcher: Arc<TrafficSwitcher>,
    builder: Arc<dyn ArtifactBuilder>,
    supervisor: Arc<dyn ProcessSupervisor>,
    sync: Arc<dyn DataSync>,
    slot_dirs: [Dir; 2],
    cleanup_dirs: Vec<Dir>,
    gate: GateOptions,
    stop: StopListener,
}

impl DeploymentController {
    /// `slot_dirs` holds the blue then green deployable unit
    pub fn new(
        collaborators: Collaborators,
        slot_dirs: [Dir; 2],
        cleanup_dirs: Vec<Dir>,
        gate: GateOptions,
    ) -> Self {
        Self {
            store: collaborators.store,
            probe: collaborators.probe,
            switcher: collaborators.switcher,
            builder: collaborators.builder,
            supervisor: collaborators.supervisor,
            sync: collaborators.sync,
            slot_dirs,
            cleanup_dirs,
            gate,
            stop: StopListener::never(),
        }
    }

    /// Abort health gating and warm-up waits when `stop` fires
    pub fn with_stop(mut self, stop: StopListener) -> Self {
        self.stop = stop;
        self
    }

    fn slot_dir(&self, slot: Slot) -> &Dir {
        match slot {
            Slot::Blue => &self.slot_dirs[0],
            Slot::Green => &self.slot_dirs[1],
        }
    }

    /// Remove stale build artifacts
    pub async fn cleanup(&self) -> CleanupReport {
        cleanup(&self.cleanup_dirs).await
    }

    /// Deploy into whichever slot is currently staged
    pub async fn deploy_staged(&self, version: &str, options: DeployOptions) -> bool {
        let target = self.store.load().await.staged_slot();
        self.deploy(target, version, options).await
    }

    /// Deploy `version` into `target`.
    ///
    /// Returns `true` only when the pipeline reaches [`DeployPhase::Done`].
    /// Every outcome is appended to the deployment history.
    pub async fn deploy(&self, target: Slot, version: &str, options: DeployOptions) -> bool {
        let live = self.store.load().await.live_slot();
        info!(target = %target, live = %live, version, "Starting deployment");

        if target == live {
            let reason = format!("{} is the live slot, deploy to {} instead", target, live.other());
            error!("Refusing deployment: {}", reason);
            self.store
                .append_record(DeploymentRecord::failed(version, target, reason))
                .await;
            return false;
        }

        let mut fsm = DeployFsm::new();
        match self.run_pipeline(&mut fsm, live, target, options).await {
            Ok(()) => {
                self.store
                    .append_record(DeploymentRecord::success(version, target))
                    .await;
                info!(target = %target, version, "Deployment complete");
                true
            }
            Err(e) => {
                let message = e.to_string();
                error!(phase = %fsm.phase(), "Deployment failed: {}", message);

                if let Err(invalid) = fsm.process(DeployEvent::Fail(message.clone())) {
                    warn!("{}", invalid);
                }
                if fsm.needs_rollback() {
                    self.rollback(target).await;
                    if let Err(invalid) = fsm.process(DeployEvent::RolledBack) {
                        warn!("{}", invalid);
                    }
                }

                self.store
                    .append_record(DeploymentRecord::failed(version, target, message))
                    .await;
                false
            }
        }
    }

    async fn run_pipeline(
        &self,
        fsm: &mut DeployFsm,
        live: Slot,
        target: Slot,
        options: DeployOptions,
    ) -> Result<(), SlotError> {
        advance(fsm, DeployEvent::Begin)?;
        let report = self.cleanup().await;
        if !report.is_clean() {
            warn!("{} cleanup path(s) could not be removed", report.failed.len());
        }
        advance(fsm, DeployEvent::Cleaned)?;

        self.validate(live, target).await?;
        advance(fsm, DeployEvent::Validated)?;

        if options.skip_sync {
            info!("Skipping data sync");
        } else if let Err(e) = self.sync.sync(live, target).await {
            warn!("Data sync failed, continuing: {}", e);
        }
        advance(fsm, DeployEvent::Synced)?;

        let build = self.builder.build(target).await?;
        if let Some(artifact) = &build.artifact {
            info!("Artifact ready at {}", artifact.display());
        }
        let started = self.supervisor.start(target).await?;
        if let StartOutcome::ManualStartRequired { reason } = &started {
            warn!("Start the {} slot manually: {}", target, reason);
        }
        advance(fsm, DeployEvent::Built)?;

        self.pause(self.gate.warmup).await?;
        self.await_healthy(target).await?;
        advance(fsm, DeployEvent::Healthy)?;

        if options.skip_switch {
            info!("Skipping traffic switch, {} stays live", live);
            return advance(fsm, DeployEvent::SwitchSkipped);
        }
        let switch = self.switcher.switch_to(target).await?;
        if switch.is_degraded() {
            warn!("Traffic switched with a degraded proxy reload: {}", switch);
        }
        advance(fsm, DeployEvent::Switched)
    }

    async fn validate(&self, live: Slot, target: Slot) -> Result<(), SlotError> {
        let slot_dir = self.slot_dir(target);
        if !slot_dir.exists().await {
            return Err(SlotError::ValidationError(format!(
                "Slot directory {} does not exist",
                slot_dir.path().display()
            )));
        }

        let live_health = self.probe.probe(live, self.gate.probe_timeout).await;
        info!("Live slot before deployment: {}", live_health.summary());
        Ok(())
    }

    /// Probe `slot` until it is healthy, the attempts run out, or the
    /// timeout elapses. Returns the attempt that succeeded.
    pub async fn await_healthy(&self, slot: Slot) -> Result<u32, SlotError> {
        let attempts = self.gate.max_attempts();
        let deadline = Instant::now() + self.gate.timeout;
        let mut made = 0;

        info!(
            slot = %slot,
            "Health gating: up to {} attempts every {:?}",
            attempts, self.gate.interval
        );
        while made < attempts {
            made += 1;
            let result = self.probe.probe(slot, self.gate.probe_timeout).await;
            if result.is_healthy() {
                info!(attempt = made, "{} passed health gating", slot);
                return Ok(made);
            }
            warn!(attempt = made, attempts, "{}", result.summary());

            if made == attempts || Instant::now() + self.gate.interval > deadline {
                break;
            }
            self.pause(self.gate.interval).await?;
        }

        Err(SlotError::HealthGateTimeout {
            slot,
            attempts: made,
        })
    }

    async fn pause(&self, duration: Duration) -> Result<(), SlotError> {
        if duration.is_zero() {
            return Ok(());
        }
        let mut stop = self.stop.clone();
        tokio::select! {
            biased;
            _ = stop.stopped() => Err(SlotError::Cancelled("deployment stopped".to_string())),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn rollback(&self, target: Slot) {
        warn!("Rolling back {}", target);
        if let Err(e) = self.supervisor.stop(target).await {
            warn!("Unable to stop {} during rollback: {}", target, e);
        }
    }
}

fn advance(fsm: &mut DeployFsm, event: DeployEvent) -> Result<(), SlotError> {
    fsm.process(event).map_err(SlotError::Internal)?;
    if fsm.phase() != DeployPhase::Done {
        info!(phase = %fsm.phase(), "Deployment phase");
    }
    Ok(())
}
