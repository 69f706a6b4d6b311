//! Rollback monitor
//!
//! A standing control loop that estimates the live slot's error rate on a
//! fixed period and fails traffic back to the other slot after sustained
//! degradation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::models::slot::Slot;
use crate::monitor::error_rate::{ErrorRateEstimator, ErrorRateSample};
use crate::monitor::notify::{RollbackNotification, RollbackNotifier};
use crate::proxy::switcher::TrafficSwitcher;
use crate::stop::{stop_channel, StopHandle, StopListener};
use crate::storage::settings::MonitorSettings;
use crate::storage::state_store::DeploymentStateStore;

/// Monitor thresholds and timing
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,

    /// Error rates strictly above this count as a failure
    pub error_threshold: f64,

    /// Consecutive failures that trigger a failback
    pub max_consecutive_failures: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        MonitorOptions::from(&MonitorSettings::default())
    }
}

impl From<&MonitorSettings> for MonitorOptions {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            interval: settings.interval(),
            error_threshold: settings.error_threshold,
            max_consecutive_failures: settings.max_consecutive_failures,
        }
    }
}

/// Result of one monitoring cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Error rate at or below the threshold, counter reset
    Nominal { sample: ErrorRateSample },

    /// Error rate above the threshold, limit not reached yet
    Degraded {
        sample: ErrorRateSample,
        consecutive_failures: u32,
    },

    /// Traffic failed back to the other slot
    RolledBack { notification: RollbackNotification },

    /// The failback itself failed, monitoring halts
    Emergency {
        from_slot: Slot,
        to_slot: Slot,
        error: String,
    },
}

/// A cycle outcome with the time it was observed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub at: DateTime<Utc>,
    pub outcome: CycleOutcome,
}

/// Why the monitoring loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum MonitorExit {
    Stopped,
    Emergency(String),
}

struct Running {
    stop: StopHandle,
    task: JoinHandle<MonitorExit>,
}

/// Watches the live slot and fails back on sustained degradation
pub struct RollbackMonitor {
    store: Arc<DeploymentStateStore>,
    switcher: Arc<TrafficSwitcher>,
    estimator: Arc<dyn ErrorRateEstimator>,
    notifier: Arc<dyn RollbackNotifier>,
    options: MonitorOptions,
    consecutive_failures: AtomicU32,
    last_cycle: Mutex<Option<CycleRecord>>,
    running: Mutex<Option<Running>>,
    exit: watch::Sender<Option<MonitorExit>>,
}

impl RollbackMonitor {
    pub fn new(
        store: Arc<DeploymentStateStore>,
        switcher: Arc<TrafficSwitcher>,
        estimator: Arc<dyn ErrorRateEstimator>,
        notifier: Arc<dyn RollbackNotifier>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            store,
            switcher,
            estimator,
            notifier,
            options,
            consecutive_failures: AtomicU32::new(0),
            last_cycle: Mutex::new(None),
            running: Mutex::new(None),
            exit: watch::channel(None).0,
        }
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_cycle(&self) -> Option<CycleRecord> {
        self.last_cycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start the monitoring loop. The first cycle runs immediately.
    ///
    /// Returns `false`, with a warning, when the loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            warn!("Rollback monitor is already running");
            return false;
        }

        let (stop, listener) = stop_channel();
        self.exit.send_replace(None);
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move { monitor.run(listener).await });
        *running = Some(Running { stop, task });
        true
    }

    /// Stop the monitoring loop at its next polling boundary and wait for it.
    ///
    /// Returns `None` when the loop was not running.
    pub async fn stop(&self) -> Option<MonitorExit> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            debug!("Rollback monitor is not running");
            return None;
        };

        running.stop.stop();
        match running.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!("Rollback monitor task failed: {}", e);
                Some(MonitorExit::Emergency(e.to_string()))
            }
        }
    }

    /// Resolves when the current loop ends on its own or is stopped
    pub async fn exited(&self) -> MonitorExit {
        let mut rx = self.exit.subscribe();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone(),
            Err(_) => None,
        };
        exit.unwrap_or(MonitorExit::Stopped)
    }

    async fn run(self: Arc<Self>, mut stop: StopListener) -> MonitorExit {
        info!(
            "Rollback monitor started: every {:?}, threshold {}, limit {}",
            self.options.interval,
            self.options.error_threshold,
            self.options.max_consecutive_failures
        );

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break MonitorExit::Stopped,
                _ = ticker.tick() => {}
            }

            if let CycleOutcome::Emergency { error, .. } = self.run_cycle().await {
                break MonitorExit::Emergency(error);
            }
        };

        info!("Rollback monitor exited: {:?}", exit);
        self.exit.send_replace(Some(exit.clone()));
        exit
    }

    /// Run one monitoring cycle
    pub async fn run_cycle(&self) -> CycleOutcome {
        let live = self.live_slot().await;
        let sample = self.estimator.estimate(live).await;
        debug!(slot = %live, rate = sample.rate, "{}", sample.reason);

        let outcome = if sample.rate > self.options.error_threshold {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                slot = %live,
                rate = sample.rate,
                threshold = self.options.error_threshold,
                "Error rate above threshold ({}/{}): {}",
                failures,
                self.options.max_consecutive_failures,
                sample.reason
            );
            if failures >= self.options.max_consecutive_failures {
                self.fail_back(live, sample.rate).await
            } else {
                CycleOutcome::Degraded {
                    sample,
                    consecutive_failures: failures,
                }
            }
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            CycleOutcome::Nominal { sample }
        };

        *self.last_cycle.lock().unwrap_or_else(|e| e.into_inner()) = Some(CycleRecord {
            at: Utc::now(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Live slot from the state store, then the proxy directive, then the default
    async fn live_slot(&self) -> Slot {
        match self.store.read_existing().await {
            Ok(Some(state)) => return state.live_slot(),
            Ok(None) => debug!("No deployment state yet"),
            Err(e) => warn!("Deployment state unavailable: {}", e),
        }
        match self.switcher.routed_slot().await {
            Some(slot) => slot,
            None => {
                warn!("Unable to determine the live slot, assuming {}", Slot::default());
                Slot::default()
            }
        }
    }

    async fn fail_back(&self, from: Slot, error_rate: f64) -> CycleOutcome {
        let to = from.other();
        warn!("Sustained errors on {}, failing back to {}", from, to);

        match self.switcher.switch_to(to).await {
            Ok(report) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                info!("Automated failback complete: {}", report);
                let notification = RollbackNotification::high_error_rate(
                    from,
                    to,
                    error_rate,
                    self.options.error_threshold,
                );
                self.notifier.notify(&notification).await;
                CycleOutcome::RolledBack { notification }
            }
            Err(e) => {
                error!(
                    critical = true,
                    from = %from,
                    to = %to,
                    "Automated failback failed, operator intervention required: {}",
                    e
                );
                CycleOutcome::Emergency {
                    from_slot: from,
                    to_slot: to,
                    error: e.to_string(),
                }
            }
        }
    }
}
