//! Monitor daemon run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::state::Orchestrator;
use crate::errors::SlotError;
use crate::monitor::rollback::{MonitorExit, RollbackMonitor};
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Longest time shutdown may take before the process exits forcibly
pub const MAX_SHUTDOWN_DELAY: Duration = Duration::from_secs(15);

/// Run the rollback monitor, and the status endpoint when enabled, until a
/// shutdown signal arrives or the monitor halts itself.
pub async fn run_monitor(
    orchestrator: &Orchestrator,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<MonitorExit, SlotError> {
    info!("Initializing rollback monitor...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), MAX_SHUTDOWN_DELAY);

    if let Err(e) = init(orchestrator, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start the monitor: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    let exit = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
            None
        }
        exit = orchestrator.monitor.exited() => Some(exit),
    };

    // Shutdown
    drop(shutdown_tx);
    let stopped = shutdown_manager.shutdown().await?;
    Ok(exit.or(stopped).unwrap_or(MonitorExit::Stopped))
}

// =============================== INITIALIZATION ================================== //

async fn init(
    orchestrator: &Orchestrator,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), SlotError> {
    orchestrator.monitor.start();
    shutdown_manager.with_monitor(orchestrator.monitor.clone())?;

    if orchestrator.settings.server.enabled {
        init_status_server(orchestrator, shutdown_manager, shutdown_tx.subscribe()).await?;
    }
    Ok(())
}

async fn init_status_server(
    orchestrator: &Orchestrator,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), SlotError> {
    info!("Initializing status server...");

    let server_state = ServerState::new(
        orchestrator.reporter.clone(),
        Some(orchestrator.monitor.clone()),
    );

    let server_handle = serve(
        &orchestrator.settings.server,
        Arc::new(server_state),
        async move {
            let _ = shutdown_rx.recv().await;
        },
    )
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    monitor: Option<Arc<RollbackMonitor>>,
    server_handle: Option<JoinHandle<Result<(), SlotError>>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            monitor: None,
            server_handle: None,
        }
    }

    fn with_monitor(&mut self, monitor: Arc<RollbackMonitor>) -> Result<(), SlotError> {
        if self.monitor.is_some() {
            return Err(SlotError::ShutdownError("monitor already set".to_string()));
        }
        self.monitor = Some(monitor);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), SlotError>>,
    ) -> Result<(), SlotError> {
        if self.server_handle.is_some() {
            return Err(SlotError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<Option<MonitorExit>, SlotError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<Option<MonitorExit>, SlotError> {
        info!("Shutting down...");

        // 1. Monitor loop
        let exit = match self.monitor.take() {
            Some(monitor) => monitor.stop().await,
            None => None,
        };

        // 2. Status server
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| SlotError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(exit)
    }
}
