//! Proxy reload control

use std::fmt;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::filesys::file::File;
use crate::shell::ShellCommand;
use crate::storage::settings::ProxySettings;

/// How a reload request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Graceful in-place reload succeeded
    Reloaded,
    /// Reload failed, a full restart succeeded
    Restarted,
    /// Configuration is correct on disk but the proxy could not pick it up
    ManualReloadRequired { reason: String },
    /// Nothing changed, no reload was attempted
    Skipped,
}

impl ReloadOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ReloadOutcome::ManualReloadRequired { .. })
    }
}

impl fmt::Display for ReloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadOutcome::Reloaded => f.write_str("reloaded"),
            ReloadOutcome::Restarted => f.write_str("restarted"),
            ReloadOutcome::ManualReloadRequired { reason } => {
                write!(f, "manual reload required ({})", reason)
            }
            ReloadOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Access to the reverse proxy's configuration and process
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Configuration file holding the routing directive
    async fn config_file(&self) -> File;

    /// Make the proxy pick up the configuration on disk. Never fails: a
    /// reload that cannot be performed is reported in the outcome.
    async fn reload(&self) -> ReloadOutcome;
}

/// Controls an nginx instance, either on the host or inside a docker container
pub struct NginxControl {
    settings: ProxySettings,
    host_config: File,
    docker_config: File,
    in_docker: OnceCell<bool>,
}

impl NginxControl {
    pub fn new(settings: ProxySettings, host_config: File, docker_config: File) -> Self {
        Self {
            settings,
            host_config,
            docker_config,
            in_docker: OnceCell::new(),
        }
    }

    /// Whether the configured container is running. Probed once.
    async fn in_docker(&self) -> bool {
        *self
            .in_docker
            .get_or_init(|| async {
                let Some(container) = &self.settings.docker_container else {
                    return false;
                };
                let probe = ShellCommand::new(format!(
                    "docker ps --filter name=^{}$ --format '{{{{.Names}}}}'",
                    container
                ));
                match probe.output().await {
                    Ok(output) if output.success => {
                        let running = output.stdout.lines().any(|l| l.trim() == container);
                        debug!(container = %container, running, "Checked proxy container");
                        running
                    }
                    Ok(output) => {
                        debug!("docker ps failed: {}", output.describe());
                        false
                    }
                    Err(e) => {
                        debug!("docker unavailable: {}", e);
                        false
                    }
                }
            })
            .await
    }

    fn commands(&self, in_docker: bool) -> (Option<String>, String, Option<String>) {
        match (&self.settings.docker_container, in_docker) {
            (Some(container), true) => (
                self.settings
                    .test_command
                    .as_ref()
                    .map(|c| format!("docker exec {} {}", container, c)),
                format!("docker exec {} {}", container, self.settings.reload_command),
                Some(format!("docker restart {}", container)),
            ),
            _ => (
                self.settings.test_command.clone(),
                self.settings.reload_command.clone(),
                self.settings.restart_command.clone(),
            ),
        }
    }
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn config_file(&self) -> File {
        if self.in_docker().await {
            self.docker_config.clone()
        } else {
            self.host_config.clone()
        }
    }

    async fn reload(&self) -> ReloadOutcome {
        let (test, reload, restart) = self.commands(self.in_docker().await);

        if let Some(test) = test {
            if let Err(e) = ShellCommand::new(test).run().await {
                warn!("Proxy configuration test failed, not reloading: {}", e);
                return ReloadOutcome::ManualReloadRequired { reason: e };
            }
        }

        let reload_error = match ShellCommand::new(reload).run().await {
            Ok(_) => {
                info!("Proxy reloaded");
                return ReloadOutcome::Reloaded;
            }
            Err(e) => e,
        };
        warn!("Proxy reload failed: {}", reload_error);

        let Some(restart) = restart else {
            return ReloadOutcome::ManualReloadRequired {
                reason: reload_error,
            };
        };
        match ShellCommand::new(restart).run().await {
            Ok(_) => {
                info!("Proxy restarted");
                ReloadOutcome::Restarted
            }
            Err(e) => {
                warn!("Proxy restart failed: {}", e);
                ReloadOutcome::ManualReloadRequired {
                    reason: format!("{}; {}", reload_error, e),
                }
            }
        }
    }
}
