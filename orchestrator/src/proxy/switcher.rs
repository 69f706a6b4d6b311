//! Traffic switching between slots

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::SlotError;
use crate::http::probe::HealthProbe;
use crate::models::slot::Slot;
use crate::proxy::directive::DirectiveCascade;
use crate::proxy::reload::{ProxyControl, ReloadOutcome};
use crate::storage::state_store::DeploymentStateStore;

/// What a successful switch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchReport {
    pub target: Slot,

    /// Slot the directive named before the switch
    pub previous: Option<Slot>,

    /// Whether the configuration file was rewritten
    pub config_written: bool,

    pub reload: ReloadOutcome,
}

impl SwitchReport {
    /// Traffic is configured for the target but the proxy did not reload
    pub fn is_degraded(&self) -> bool {
        self.reload.is_degraded()
    }
}

impl fmt::Display for SwitchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.previous {
            Some(previous) => write!(f, "{} -> {}", previous, self.target)?,
            None => write!(f, "-> {}", self.target)?,
        }
        if !self.config_written {
            f.write_str(" (already routed)")?;
        }
        write!(f, ", proxy {}", self.reload)
    }
}

/// Points the reverse proxy at a slot and records the new live slot
pub struct TrafficSwitcher {
    probe: Arc<dyn HealthProbe>,
    proxy: Arc<dyn ProxyControl>,
    cascade: DirectiveCascade,
    store: Arc<DeploymentStateStore>,
    probe_timeout: Duration,
    switch_lock: Mutex<()>,
}

impl TrafficSwitcher {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        proxy: Arc<dyn ProxyControl>,
        cascade: DirectiveCascade,
        store: Arc<DeploymentStateStore>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            probe,
            proxy,
            cascade,
            store,
            probe_timeout,
            switch_lock: Mutex::new(()),
        }
    }

    /// Slot the proxy configuration routes to, if it can be read and parsed
    pub async fn routed_slot(&self) -> Option<Slot> {
        let file = self.proxy.config_file().await;
        match file.read_string().await {
            Ok(config) => self.cascade.current_slot(&config),
            Err(e) => {
                debug!("Unable to read {}: {}", file.path().display(), e);
                None
            }
        }
    }

    /// Route live traffic to `target`.
    ///
    /// The target must probe healthy before the configuration is touched. A
    /// directive that already names the target is left alone and the proxy is
    /// not reloaded. A failed reload is a degraded success.
    pub async fn switch_to(&self, target: Slot) -> Result<SwitchReport, SlotError> {
        let _guard = self.switch_lock.lock().await;
        info!(target = %target, "Switching traffic");

        let health = self.probe.probe(target, self.probe_timeout).await;
        if !health.is_healthy() {
            warn!("Refusing to switch: {}", health.summary());
            return Err(SlotError::TargetUnhealthy {
                slot: target,
                status: health.status,
            });
        }

        let file = self.proxy.config_file().await;
        let config = file.read_string().await?;
        let rewrite = self.cascade.rewrite(file.path(), &config, target)?;

        let (config_written, reload) = if rewrite.previous == Some(target) {
            info!(
                "{} already routes to {}, leaving it untouched",
                file.path().display(),
                target
            );
            (false, ReloadOutcome::Skipped)
        } else {
            if !rewrite.changed {
                return Err(SlotError::RewriteVerification {
                    path: file.path().to_path_buf(),
                    target,
                });
            }
            file.write_string(&rewrite.text).await?;

            let written = file.read_string().await?;
            if self.cascade.current_slot(&written) != Some(target) {
                return Err(SlotError::RewriteVerification {
                    path: file.path().to_path_buf(),
                    target,
                });
            }
            debug!("Verified routing directive in {}", file.path().display());

            let reload = self.proxy.reload().await;
            if reload.is_degraded() {
                warn!(
                    "Traffic configuration points at {} but the proxy was not reloaded: {}",
                    target, reload
                );
            }
            (true, reload)
        };

        self.store.promote(target).await;

        let report = SwitchReport {
            target,
            previous: rewrite.previous,
            config_written,
            reload,
        };
        info!("Traffic switched: {}", report);
        Ok(report)
    }
}
