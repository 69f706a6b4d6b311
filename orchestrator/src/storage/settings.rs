//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::SlotError;
use crate::filesys::file::File;
use crate::logs::{LogFormat, LogLevel};
use crate::models::slot::Slot;

/// Default settings file name, resolved against the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "slotctl.json";

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Directory for a daily-rolling log file, stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Project root all relative paths resolve against
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Persisted deployment state
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    #[serde(default)]
    pub slots: SlotsSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub deploy: DeploySettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("deployment/.deployment-state.json")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Text,
            log_dir: None,
            root_dir: default_root_dir(),
            state_file: default_state_file(),
            slots: SlotsSettings::default(),
            proxy: ProxySettings::default(),
            deploy: DeploySettings::default(),
            monitor: MonitorSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it is absent
    pub async fn load(file: &File) -> Result<Self, SlotError> {
        let settings = if file.exists().await {
            file.read_json::<Settings>().await.map_err(|e| {
                SlotError::ConfigError(format!(
                    "Unable to read settings file {}: {}",
                    file.path().display(),
                    e
                ))
            })?
        } else {
            info!(
                "No settings file at {}, using defaults",
                file.path().display()
            );
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), SlotError> {
        let fail = |msg: String| Err(SlotError::ConfigError(msg));

        if self.slots.blue.port == self.slots.green.port {
            return fail(format!(
                "blue and green slots share port {}",
                self.slots.blue.port
            ));
        }
        for slot in Slot::ALL {
            self.slots.endpoint(slot).health_url()?;
        }
        if self.proxy.routing_variable.trim().is_empty() {
            return fail("proxy.routingVariable must not be empty".to_string());
        }
        if self.deploy.health_check_interval_secs == 0 {
            return fail("deploy.healthCheckIntervalSecs must be positive".to_string());
        }
        if self.deploy.health_check_timeout_secs < self.deploy.health_check_interval_secs {
            return fail(
                "deploy.healthCheckTimeoutSecs must be at least one interval".to_string(),
            );
        }
        if self.deploy.move_backoff_multiplier < 1.0 {
            return fail("deploy.moveBackoffMultiplier must be >= 1.0".to_string());
        }
        if self.monitor.interval_secs == 0 {
            return fail("monitor.intervalSecs must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.monitor.error_threshold) {
            return fail("monitor.errorThreshold must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.monitor.nominal_error_rate) {
            return fail("monitor.nominalErrorRate must be within [0, 1]".to_string());
        }
        if self.monitor.max_consecutive_failures == 0 {
            return fail("monitor.maxConsecutiveFailures must be positive".to_string());
        }
        if self.monitor.slow_response_ms >= self.monitor.probe_timeout_ms {
            return fail(format!(
                "monitor.slowResponseMs ({}) must be below monitor.probeTimeoutMs ({})",
                self.monitor.slow_response_ms, self.monitor.probe_timeout_ms
            ));
        }
        Ok(())
    }
}

/// Per-slot endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsSettings {
    #[serde(default = "default_blue_endpoint")]
    pub blue: SlotEndpoint,

    #[serde(default = "default_green_endpoint")]
    pub green: SlotEndpoint,
}

impl SlotsSettings {
    pub fn endpoint(&self, slot: Slot) -> &SlotEndpoint {
        match slot {
            Slot::Blue => &self.blue,
            Slot::Green => &self.green,
        }
    }
}

fn default_blue_endpoint() -> SlotEndpoint {
    SlotEndpoint::localhost(5000)
}

fn default_green_endpoint() -> SlotEndpoint {
    SlotEndpoint::localhost(5001)
}

impl Default for SlotsSettings {
    fn default() -> Self {
        Self {
            blue: default_blue_endpoint(),
            green: default_green_endpoint(),
        }
    }
}

/// Where a slot's service listens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEndpoint {
    #[serde(default = "default_slot_host")]
    pub host: String,

    pub port: u16,

    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_slot_host() -> String {
    "localhost".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl SlotEndpoint {
    pub fn localhost(port: u16) -> Self {
        Self {
            host: default_slot_host(),
            port,
            health_path: default_health_path(),
        }
    }

    /// Base URL of the slot's service
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL of the slot's health endpoint
    pub fn health_url(&self) -> Result<url::Url, SlotError> {
        url::Url::parse(&self.base_url())
            .and_then(|base| base.join(&self.health_path))
            .map_err(|e| {
                SlotError::ConfigError(format!("Invalid slot endpoint {}: {}", self.base_url(), e))
            })
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// Proxy configuration holding the routing directive
    #[serde(default = "default_proxy_config")]
    pub config_path: PathBuf,

    /// Variable assigned by the routing directive
    #[serde(default = "default_routing_variable")]
    pub routing_variable: String,

    /// Validates the configuration before a reload
    #[serde(default = "default_test_command")]
    pub test_command: Option<String>,

    /// Graceful in-place reload
    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    /// Full restart used when the reload fails
    #[serde(default = "default_restart_command")]
    pub restart_command: Option<String>,

    /// Container running the proxy, when it runs under docker
    #[serde(default)]
    pub docker_container: Option<String>,

    /// Configuration mounted into the docker container
    #[serde(default = "default_docker_config")]
    pub docker_config_path: PathBuf,
}

fn default_proxy_config() -> PathBuf {
    PathBuf::from("deployment/nginx/nginx.conf")
}

fn default_docker_config() -> PathBuf {
    PathBuf::from("deployment/nginx/nginx.docker.conf")
}

fn default_routing_variable() -> String {
    "$active_environment".to_string()
}

fn default_test_command() -> Option<String> {
    Some("nginx -t".to_string())
}

fn default_reload_command() -> String {
    "nginx -s reload".to_string()
}

fn default_restart_command() -> Option<String> {
    Some("systemctl restart nginx".to_string())
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            config_path: default_proxy_config(),
            routing_variable: default_routing_variable(),
            test_command: default_test_command(),
            reload_command: default_reload_command(),
            restart_command: default_restart_command(),
            docker_container: None,
            docker_config_path: default_docker_config(),
        }
    }
}

/// Deployment pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySettings {
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_secs: u64,

    /// Timeout of each individual probe
    #[serde(default = "default_deploy_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Wait after starting the slot process before gating begins
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,

    #[serde(default = "default_move_retries")]
    pub move_retries: u32,

    #[serde(default = "default_move_base_delay")]
    pub move_base_delay_ms: u64,

    #[serde(default = "default_move_multiplier")]
    pub move_backoff_multiplier: f64,

    /// Stale build artifacts removed before each deployment
    #[serde(default = "default_cleanup_paths")]
    pub cleanup_paths: Vec<PathBuf>,

    /// Deployable unit of a slot, `{slot}` is substituted
    #[serde(default = "default_slot_dir")]
    pub slot_dir: String,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Opaque data-sync step, skipped when absent
    #[serde(default)]
    pub sync_command: Option<String>,
}

fn default_health_interval() -> u64 {
    5
}

fn default_health_timeout() -> u64 {
    30
}

fn default_deploy_probe_timeout() -> u64 {
    3000
}

fn default_warmup() -> u64 {
    5
}

fn default_move_retries() -> u32 {
    5
}

fn default_move_base_delay() -> u64 {
    1000
}

fn default_move_multiplier() -> f64 {
    1.5
}

fn default_cleanup_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("frontend/build"),
        PathBuf::from("frontend/build-blue"),
        PathBuf::from("frontend/build-green"),
        PathBuf::from("frontend/node_modules/.cache"),
    ]
}

fn default_slot_dir() -> String {
    "backend/{slot}".to_string()
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_interval(),
            health_check_timeout_secs: default_health_timeout(),
            probe_timeout_ms: default_deploy_probe_timeout(),
            warmup_secs: default_warmup(),
            move_retries: default_move_retries(),
            move_base_delay_ms: default_move_base_delay(),
            move_backoff_multiplier: default_move_multiplier(),
            cleanup_paths: default_cleanup_paths(),
            slot_dir: default_slot_dir(),
            build: BuildSettings::default(),
            supervisor: SupervisorSettings::default(),
            sync_command: None,
        }
    }
}

impl DeploySettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }
}

/// Build step settings. Path values are templates, `{slot}` is substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSettings {
    #[serde(default = "default_build_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_build_command")]
    pub command: Option<String>,

    /// Run before building when `node_modules` is missing from the work dir
    #[serde(default = "default_install_command")]
    pub install_command: Option<String>,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Per-slot env file copied to `env_target` before building
    #[serde(default = "default_env_template")]
    pub env_template: Option<String>,

    #[serde(default = "default_env_target")]
    pub env_target: String,
}

fn default_build_work_dir() -> String {
    "frontend".to_string()
}

fn default_build_command() -> Option<String> {
    Some("npm run build".to_string())
}

fn default_install_command() -> Option<String> {
    Some("npm install".to_string())
}

fn default_output_dir() -> String {
    "frontend/build".to_string()
}

fn default_artifact_dir() -> String {
    "frontend/build-{slot}".to_string()
}

fn default_env_template() -> Option<String> {
    Some("frontend/env.{slot}".to_string())
}

fn default_env_target() -> String {
    "frontend/.env".to_string()
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            work_dir: default_build_work_dir(),
            command: default_build_command(),
            install_command: default_install_command(),
            output_dir: default_output_dir(),
            artifact_dir: default_artifact_dir(),
            env_template: default_env_template(),
            env_target: default_env_target(),
        }
    }
}

/// Process supervisor kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorKind {
    #[default]
    Pm2,
    /// No supervisor, slot processes are started by hand
    None,
}

/// Process supervisor settings. String values are templates: `{slot}` and
/// `{port}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSettings {
    #[serde(default)]
    pub kind: SupervisorKind,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_script")]
    pub script: String,

    #[serde(default = "default_script_cwd")]
    pub cwd: String,

    /// Extra environment for the slot process
    #[serde(default = "default_process_env")]
    pub env: BTreeMap<String, String>,
}

fn default_service_name() -> String {
    "backend-{slot}".to_string()
}

fn default_script() -> String {
    "backend/shared/server.js".to_string()
}

fn default_script_cwd() -> String {
    "backend/shared".to_string()
}

fn default_process_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("NODE_ENV".to_string(), "production".to_string()),
        (
            "MONGODB_URI".to_string(),
            "mongodb://localhost:27017/mernapp_{slot}".to_string(),
        ),
    ])
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            kind: SupervisorKind::default(),
            service_name: default_service_name(),
            script: default_script(),
            cwd: default_script_cwd(),
            env: default_process_env(),
        }
    }
}

/// Rollback monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    /// Error rates strictly above this count as a failure
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,

    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Must exceed `slow_response_ms` so slow answers are not cut off as unreachable
    #[serde(default = "default_monitor_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Health responses slower than this are treated as degraded
    #[serde(default = "default_slow_response")]
    pub slow_response_ms: u64,

    /// Error rate reported for a fully healthy slot
    #[serde(default)]
    pub nominal_error_rate: f64,
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_error_threshold() -> f64 {
    0.05
}

fn default_max_failures() -> u32 {
    3
}

fn default_monitor_probe_timeout() -> u64 {
    10000
}

fn default_slow_response() -> u64 {
    5000
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            error_threshold: default_error_threshold(),
            max_consecutive_failures: default_max_failures(),
            probe_timeout_ms: default_monitor_probe_timeout(),
            slow_response_ms: default_slow_response(),
            nominal_error_rate: 0.0,
        }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn slow_response(&self) -> Duration {
        Duration::from_millis(self.slow_response_ms)
    }
}

/// Operator status endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8089
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
