//! slotctl - Entry Point
//!
//! Deploys into the staged slot, switches traffic between slots, and runs the
//! rollback monitor.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use slotctl::app::run::run_monitor;
use slotctl::app::state::Orchestrator;
use slotctl::deploy::controller::DeployOptions;
use slotctl::filesys::file::File;
use slotctl::logs::{init_logging, LogLevel, LogOptions};
use slotctl::models::slot::Slot;
use slotctl::monitor::rollback::{CycleOutcome, MonitorExit};
use slotctl::status::{HealthSummary, SlotStatus, StatusSnapshot};
use slotctl::stop::stop_channel;
use slotctl::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use slotctl::utils::version_info;

/// Blue/green slot deployment orchestrator
#[derive(Parser)]
#[command(name = "slotctl")]
#[command(about = "Blue/green deployments with health-gated promotion and automatic failback")]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, start, health-gate and promote a slot
    Deploy {
        /// Slot to deploy into (blue/a or green/b)
        slot: Slot,

        /// Version label recorded in the history
        #[arg(default_value = "manual")]
        version: String,

        /// Skip the data sync step
        #[arg(long)]
        skip_sync: bool,

        /// Leave traffic on the live slot after health gating
        #[arg(long)]
        skip_switch: bool,
    },

    /// Route traffic to a slot, the staged slot by default
    Switch {
        slot: Option<Slot>,
    },

    /// Show the deployment state and probe both slots
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Probe both slots
    Health,

    /// Remove stale build artifacts
    Cleanup,

    /// Run the rollback monitor
    Monitor {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    // Retrieve the settings file
    let settings = Settings::load(&File::new(&cli.config))
        .await
        .with_context(|| format!("Unable to load settings from {}", cli.config.display()))?;

    // Initialize logging
    let log_options = LogOptions {
        log_level: if cli.verbose {
            LogLevel::Debug
        } else {
            settings.log_level.clone()
        },
        log_dir: settings.log_dir.clone(),
        format: settings.log_format,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let (stop, stop_listener) = stop_channel();
    let orchestrator = Orchestrator::from_settings(settings, stop_listener)?;

    match cli.command {
        Commands::Deploy {
            slot,
            version,
            skip_sync,
            skip_switch,
        } => {
            tokio::spawn(async move {
                await_shutdown_signal().await;
                stop.stop();
            });
            let options = DeployOptions {
                skip_sync,
                skip_switch,
            };
            let deployed = orchestrator.controller.deploy(slot, &version, options).await;
            if deployed {
                println!("{} deployed {} to {}", "✓".green().bold(), version, slot);
            } else {
                println!("{} deployment of {} to {} failed", "✗".red().bold(), version, slot);
            }
            Ok(deployed)
        }

        Commands::Switch { slot } => {
            let target = match slot {
                Some(slot) => slot,
                None => orchestrator.store.load().await.staged_slot(),
            };
            let report = orchestrator.switcher.switch_to(target).await?;
            if report.is_degraded() {
                println!("{} traffic switched with warnings: {}", "!".yellow().bold(), report);
            } else {
                println!("{} traffic switched: {}", "✓".green().bold(), report);
            }
            Ok(true)
        }

        Commands::Status { json } => {
            let snapshot = orchestrator.reporter.snapshot().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_status(&snapshot);
            }
            Ok(true)
        }

        Commands::Health => {
            let snapshot = orchestrator.reporter.snapshot().await;
            for slot in &snapshot.slots {
                print_slot(slot);
            }
            let summary = HealthSummary::from_results(snapshot.slots.iter().map(|s| &s.health));
            match summary {
                HealthSummary::BothHealthy => println!("{}", summary.to_string().green().bold()),
                HealthSummary::OneHealthy(_) => println!("{}", summary.to_string().yellow().bold()),
                HealthSummary::NoneHealthy => println!("{}", summary.to_string().red().bold()),
            }
            Ok(snapshot
                .slot(snapshot.live_slot)
                .is_some_and(|s| s.health.is_healthy()))
        }

        Commands::Cleanup => {
            let report = orchestrator.controller.cleanup().await;
            for path in &report.removed {
                println!("removed {}", path.display());
            }
            for (path, error) in &report.failed {
                println!("{} {}: {}", "failed".red(), path.display(), error);
            }
            if report.removed.is_empty() && report.failed.is_empty() {
                println!("nothing to clean");
            }
            Ok(report.is_clean())
        }

        Commands::Monitor { once: true } => {
            let outcome = orchestrator.monitor.run_cycle().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(!matches!(outcome, CycleOutcome::Emergency { .. }))
        }

        Commands::Monitor { once: false } => {
            let exit = run_monitor(&orchestrator, await_shutdown_signal()).await?;
            info!("Monitor exited: {:?}", exit);
            Ok(exit == MonitorExit::Stopped)
        }

        Commands::Version => Ok(true),
    }
}

fn print_status(snapshot: &StatusSnapshot) {
    println!("{}", "Deployment status".bold());
    println!("  live:    {}", snapshot.live_slot.to_string().green().bold());
    println!("  staged:  {}", snapshot.staged_slot);
    println!("  updated: {}", snapshot.last_updated.to_rfc3339());
    if let Some(last) = &snapshot.last_deployment {
        println!(
            "  last:    {} -> {} ({:?})",
            last.version, last.slot, last.status
        );
    }

    println!();
    println!("{}", "Slots".bold());
    for slot in &snapshot.slots {
        print_slot(slot);
    }

    if !snapshot.recent_history.is_empty() {
        println!();
        println!("{}", "Recent deployments".bold());
        for record in snapshot.recent_history.iter().rev() {
            let status = if record.is_success() {
                "success".green()
            } else {
                "failed".red()
            };
            print!(
                "  {}  {:<8} {:<12} {}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.slot,
                record.version,
                status
            );
            match &record.error_detail {
                Some(error) => println!("  {}", error.dimmed()),
                None => println!(),
            }
        }
    }
}

fn print_slot(slot: &SlotStatus) {
    let result = &slot.health;
    let marker = if slot.live { "*" } else { " " };
    let status = if result.is_healthy() {
        result.status.to_string().green()
    } else {
        result.status.to_string().red()
    };
    print!(
        " {} {:<6} {:<11} {:>5}ms  port {:<5} {}",
        marker,
        result.slot,
        status,
        result.latency.as_millis(),
        slot.port,
        slot.url
    );
    if let Some(payload) = &result.payload {
        if let Some(service) = &payload.service {
            print!("  service {}", service);
        }
        if let Some(database) = payload.database {
            print!("  database {}", database);
        }
    }
    match &result.error {
        Some(error) => println!("  {}", error.dimmed()),
        None => println!(),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        use tracing::warn;

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Unable to install signal handlers, waiting for Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
