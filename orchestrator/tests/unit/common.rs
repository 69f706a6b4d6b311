//! Test doubles and fixtures

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slot_api::HealthPayload;
use tempfile::TempDir;

use slotctl::deploy::builder::{ArtifactBuilder, BuildReport};
use slotctl::deploy::controller::{Collaborators, DeploymentController, GateOptions};
use slotctl::deploy::supervisor::{ProcessSupervisor, StartOutcome};
use slotctl::deploy::sync::DataSync;
use slotctl::errors::SlotError;
use slotctl::filesys::dir::Dir;
use slotctl::filesys::file::File;
use slotctl::http::probe::HealthProbe;
use slotctl::models::health::{HealthResult, HealthStatus};
use slotctl::models::slot::Slot;
use slotctl::monitor::error_rate::{ErrorRateEstimator, ErrorRateSample};
use slotctl::monitor::notify::{RollbackNotification, RollbackNotifier};
use slotctl::proxy::directive::DirectiveCascade;
use slotctl::proxy::reload::{ProxyControl, ReloadOutcome};
use slotctl::proxy::switcher::TrafficSwitcher;
use slotctl::storage::state_store::DeploymentStateStore;

pub const ROUTING_VARIABLE: &str = "$active_environment";

pub fn nginx_config(slot: &str) -> String {
    format!(
        r#"events {{}}
http {{
    upstream blue {{ server 127.0.0.1:5000; }}
    upstream green {{ server 127.0.0.1:5001; }}

    server {{
        listen 80;
        set $active_environment "{slot}";
        location / {{ proxy_pass http://$active_environment; }}
    }}
}}
"#
    )
}

pub fn health_result(slot: Slot, status: HealthStatus) -> HealthResult {
    let latency = Duration::from_millis(5);
    match status {
        HealthStatus::Healthy => {
            HealthResult::healthy(slot, HealthPayload::healthy("api", slot.as_str()), latency)
        }
        HealthStatus::Unhealthy => HealthResult::unhealthy(
            slot,
            503,
            None,
            Some("service unavailable".to_string()),
            latency,
        ),
        HealthStatus::Unreachable => HealthResult::unreachable(slot, "connection refused", latency),
    }
}

// =============================== HEALTH PROBE ================================== //

/// Scripted probe: queued results first, then the slot's standing status
pub struct FakeProbe {
    standing: Mutex<HashMap<Slot, HealthStatus>>,
    scripted: Mutex<HashMap<Slot, VecDeque<HealthStatus>>>,
    calls: Mutex<HashMap<Slot, u32>>,
}

impl FakeProbe {
    pub fn new(blue: HealthStatus, green: HealthStatus) -> Self {
        Self {
            standing: Mutex::new(HashMap::from([(Slot::Blue, blue), (Slot::Green, green)])),
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy, HealthStatus::Healthy)
    }

    pub fn set(&self, slot: Slot, status: HealthStatus) {
        self.standing.lock().unwrap().insert(slot, status);
    }

    pub fn script(&self, slot: Slot, statuses: Vec<HealthStatus>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(slot)
            .or_default()
            .extend(statuses);
    }

    pub fn calls(&self, slot: Slot) -> u32 {
        self.calls.lock().unwrap().get(&slot).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, slot: Slot, _timeout: Duration) -> HealthResult {
        *self.calls.lock().unwrap().entry(slot).or_default() += 1;
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&slot)
            .and_then(|queue| queue.pop_front());
        let status = scripted.unwrap_or_else(|| self.standing.lock().unwrap()[&slot]);
        health_result(slot, status)
    }
}

// ================================== PROXY ====================================== //

pub struct FakeProxy {
    config: File,
    outcome: Mutex<ReloadOutcome>,
    reloads: AtomicU32,
}

impl FakeProxy {
    pub fn new(config: File) -> Self {
        Self {
            config,
            outcome: Mutex::new(ReloadOutcome::Reloaded),
            reloads: AtomicU32::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: ReloadOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn reloads(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyControl for FakeProxy {
    async fn config_file(&self) -> File {
        self.config.clone()
    }

    async fn reload(&self) -> ReloadOutcome {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.outcome.lock().unwrap().clone()
    }
}

// ============================ DEPLOY COLLABORATORS ============================= //

#[derive(Default)]
pub struct FakeSupervisor {
    pub started: Mutex<Vec<Slot>>,
    pub stopped: Mutex<Vec<Slot>>,
}

impl FakeSupervisor {
    pub fn started(&self) -> Vec<Slot> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<Slot> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn start(&self, slot: Slot) -> Result<StartOutcome, SlotError> {
        self.started.lock().unwrap().push(slot);
        Ok(StartOutcome::Started)
    }

    async fn stop(&self, slot: Slot) -> Result<(), SlotError> {
        self.stopped.lock().unwrap().push(slot);
        Err(SlotError::SupervisorError("pm2 not responding".to_string()))
    }
}

#[derive(Default)]
pub struct FakeBuilder {
    pub fail_with: Mutex<Option<String>>,
    pub builds: Mutex<Vec<Slot>>,
}

impl FakeBuilder {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Mutex::new(Some(message.to_string())),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn builds(&self) -> Vec<Slot> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactBuilder for FakeBuilder {
    async fn build(&self, slot: Slot) -> Result<BuildReport, SlotError> {
        self.builds.lock().unwrap().push(slot);
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(SlotError::BuildError(message));
        }
        Ok(BuildReport {
            artifact: None,
            moved_by: None,
        })
    }
}

#[derive(Default)]
pub struct FakeSync {
    pub fail: bool,
    pub calls: Mutex<Vec<(Slot, Slot)>>,
}

impl FakeSync {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Slot, Slot)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSync for FakeSync {
    async fn sync(&self, source: Slot, target: Slot) -> Result<(), SlotError> {
        self.calls.lock().unwrap().push((source, target));
        if self.fail {
            return Err(SlotError::SyncError("mongodump failed".to_string()));
        }
        Ok(())
    }
}

// ================================== MONITOR ==================================== //

/// Scripted error rates, then a standing rate
pub struct FakeEstimator {
    rates: Mutex<VecDeque<f64>>,
    standing: f64,
    pub slots: Mutex<Vec<Slot>>,
}

impl FakeEstimator {
    pub fn new(rates: Vec<f64>, standing: f64) -> Self {
        Self {
            rates: Mutex::new(rates.into()),
            standing,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.slots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorRateEstimator for FakeEstimator {
    async fn estimate(&self, slot: Slot) -> ErrorRateSample {
        self.slots.lock().unwrap().push(slot);
        let rate = self.rates.lock().unwrap().pop_front().unwrap_or(self.standing);
        ErrorRateSample {
            slot,
            rate,
            reason: "scripted".to_string(),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<RollbackNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<RollbackNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RollbackNotifier for RecordingNotifier {
    async fn notify(&self, notification: &RollbackNotification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

// ================================== HARNESS ==================================== //

/// A project in a temporary directory wired with fakes
pub struct Harness {
    pub dir: TempDir,
    pub config: File,
    pub store: Arc<DeploymentStateStore>,
    pub probe: Arc<FakeProbe>,
    pub proxy: Arc<FakeProxy>,
    pub switcher: Arc<TrafficSwitcher>,
    pub supervisor: Arc<FakeSupervisor>,
    pub builder: Arc<FakeBuilder>,
    pub sync: Arc<FakeSync>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeProbe::healthy(), FakeBuilder::default(), FakeSync::default())
    }

    pub fn with(probe: FakeProbe, builder: FakeBuilder, sync: FakeSync) -> Self {
        let dir = TempDir::new().unwrap();
        for slot in Slot::ALL {
            std::fs::create_dir_all(dir.path().join("backend").join(slot.as_str())).unwrap();
        }
        let config_path = dir.path().join("nginx.conf");
        std::fs::write(&config_path, nginx_config("blue")).unwrap();

        let config = File::new(config_path);
        let store = Arc::new(DeploymentStateStore::new(File::new(
            dir.path().join(".deployment-state.json"),
        )));
        let probe = Arc::new(probe);
        let proxy = Arc::new(FakeProxy::new(config.clone()));
        let switcher = Arc::new(TrafficSwitcher::new(
            probe.clone(),
            proxy.clone(),
            DirectiveCascade::nginx(ROUTING_VARIABLE).unwrap(),
            store.clone(),
            Duration::from_secs(3),
        ));

        Self {
            dir,
            config,
            store,
            probe,
            proxy,
            switcher,
            supervisor: Arc::new(FakeSupervisor::default()),
            builder: Arc::new(builder),
            sync: Arc::new(sync),
        }
    }

    pub fn controller(&self) -> DeploymentController {
        self.controller_with(GateOptions::default())
    }

    pub fn controller_with(&self, gate: GateOptions) -> DeploymentController {
        DeploymentController::new(
            Collaborators {
                store: self.store.clone(),
                probe: self.probe.clone(),
                switcher: self.switcher.clone(),
                builder: self.builder.clone(),
                supervisor: self.supervisor.clone(),
                sync: self.sync.clone(),
            },
            Slot::ALL.map(|slot| Dir::new(self.dir.path().join("backend").join(slot.as_str()))),
            vec![Dir::new(self.dir.path().join("frontend/build"))],
            gate,
        )
    }

    pub fn config_text(&self) -> String {
        std::fs::read_to_string(self.config.path()).unwrap()
    }

    pub fn routed_slot(&self) -> Option<Slot> {
        DirectiveCascade::nginx(ROUTING_VARIABLE)
            .unwrap()
            .current_slot(&self.config_text())
    }
}
