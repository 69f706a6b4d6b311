//! Error types for the slot orchestrator

use std::path::PathBuf;

use thiserror::Error;

use crate::models::health::HealthStatus;
use crate::models::slot::Slot;

/// Main error type for the slot orchestrator
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("State store error: {0}")]
    StateError(String),

    #[error(
        "Routing directive not found in {}: expected pattern `{pattern}`{}",
        path.display(),
        found_line
            .as_ref()
            .map(|(n, l)| format!(" (line {}: `{}`)", n, l))
            .unwrap_or_default()
    )]
    DirectiveNotFound {
        path: PathBuf,
        pattern: String,
        found_line: Option<(usize, String)>,
    },

    #[error("Ambiguous routing directive in {}: {count} assignments matched `{pattern}`", path.display())]
    AmbiguousDirective {
        path: PathBuf,
        pattern: String,
        count: usize,
    },

    #[error("Routing directive rewrite in {} did not take effect (target {target})", path.display())]
    RewriteVerification { path: PathBuf, target: Slot },

    #[error("Cannot switch traffic to {slot}: environment is {status}")]
    TargetUnhealthy { slot: Slot, status: HealthStatus },

    #[error("Health gating failed for {slot} after {attempts} attempts")]
    HealthGateTimeout { slot: Slot, attempts: u32 },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Supervisor error: {0}")]
    SupervisorError(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for SlotError {
    fn from(err: anyhow::Error) -> Self {
        SlotError::Internal(err.to_string())
    }
}
