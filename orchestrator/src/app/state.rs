//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::deploy::builder::{ArtifactBuilder, CommandBuilder};
use crate::deploy::controller::{Collaborators, DeploymentController, GateOptions};
use crate::deploy::supervisor::{ManualSupervisor, Pm2Supervisor, ProcessSupervisor};
use crate::deploy::sync::{CommandDataSync, DataSync};
use crate::errors::SlotError;
use crate::http::probe::{HealthProbe, HttpHealthProbe};
use crate::models::slot::Slot;
use crate::monitor::error_rate::HealthErrorRateEstimator;
use crate::monitor::notify::LogNotifier;
use crate::monitor::rollback::{MonitorOptions, RollbackMonitor};
use crate::proxy::directive::DirectiveCascade;
use crate::proxy::reload::{NginxControl, ProxyControl};
use crate::proxy::switcher::TrafficSwitcher;
use crate::status::StatusReporter;
use crate::stop::StopListener;
use crate::storage::layout::ProjectLayout;
use crate::storage::settings::{Settings, SupervisorKind};
use crate::storage::state_store::DeploymentStateStore;
use crate::utils::CooldownOptions;

/// Fully wired orchestrator components
pub struct Orchestrator {
    pub settings: Settings,
    pub layout: ProjectLayout,
    pub store: Arc<DeploymentStateStore>,
    pub probe: Arc<dyn HealthProbe>,
    pub switcher: Arc<TrafficSwitcher>,
    pub controller: Arc<DeploymentController>,
    pub monitor: Arc<RollbackMonitor>,
    pub reporter: Arc<StatusReporter>,
}

impl Orchestrator {
    /// Wire the production implementations described by `settings`.
    ///
    /// `stop` cancels in-flight deployment waits.
    pub fn from_settings(settings: Settings, stop: StopListener) -> Result<Self, SlotError> {
        let layout = ProjectLayout::new(settings.root_dir.clone());
        info!("Project root: {}", layout.root_dir.display());

        let store = Arc::new(DeploymentStateStore::new(layout.state_file(&settings)));
        let probe: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::new(settings.slots.clone())?);
        let proxy: Arc<dyn ProxyControl> = Arc::new(NginxControl::new(
            settings.proxy.clone(),
            layout.proxy_config_file(&settings),
            layout.proxy_docker_config_file(&settings),
        ));
        let switcher = Arc::new(TrafficSwitcher::new(
            probe.clone(),
            proxy,
            DirectiveCascade::nginx(&settings.proxy.routing_variable)?,
            store.clone(),
            settings.deploy.probe_timeout(),
        ));

        let builder: Arc<dyn ArtifactBuilder> = Arc::new(CommandBuilder::new(
            settings.deploy.build.clone(),
            layout.clone(),
            settings.deploy.move_retries,
            CooldownOptions::from(&settings.deploy),
        ));
        let supervisor: Arc<dyn ProcessSupervisor> = match settings.deploy.supervisor.kind {
            SupervisorKind::Pm2 => Arc::new(Pm2Supervisor::new(
                settings.deploy.supervisor.clone(),
                settings.slots.clone(),
                layout.clone(),
                settings.deploy.slot_dir.clone(),
            )),
            SupervisorKind::None => Arc::new(ManualSupervisor),
        };
        let sync: Arc<dyn DataSync> = Arc::new(CommandDataSync::new(
            settings.deploy.sync_command.clone(),
            layout.root_dir.clone(),
        ));

        let controller = Arc::new(DeploymentController::new(
            Collaborators {
                store: store.clone(),
                probe: probe.clone(),
                switcher: switcher.clone(),
                builder,
                supervisor,
                sync,
            },
            Slot::ALL.map(|slot| layout.slot_dir(&settings, slot)),
            layout.cleanup_dirs(&settings),
            GateOptions::from(&settings.deploy),
        )
        .with_stop(stop));

        let monitor = Arc::new(RollbackMonitor::new(
            store.clone(),
            switcher.clone(),
            Arc::new(HealthErrorRateEstimator::new(probe.clone(), &settings.monitor)),
            Arc::new(LogNotifier),
            MonitorOptions::from(&settings.monitor),
        ));

        let reporter = Arc::new(StatusReporter::new(
            store.clone(),
            probe.clone(),
            settings.slots.clone(),
            settings.deploy.probe_timeout(),
        ));

        Ok(Self {
            settings,
            layout,
            store,
            probe,
            switcher,
            controller,
            monitor,
            reporter,
        })
    }
}
