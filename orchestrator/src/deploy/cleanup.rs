//! Best-effort removal of stale build artifacts

use std::path::PathBuf;

use tracing::{info, warn};

use crate::filesys::dir::Dir;

/// What a cleanup pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove every existing directory. Failures are collected, never raised.
pub async fn cleanup(dirs: &[Dir]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for dir in dirs {
        if !dir.exists().await {
            continue;
        }
        match dir.delete().await {
            Ok(()) => {
                info!("Removed {}", dir.path().display());
                report.removed.push(dir.path().to_path_buf());
            }
            Err(e) => {
                warn!("Unable to remove {}: {}", dir.path().display(), e);
                report.failed.push((dir.path().to_path_buf(), e.to_string()));
            }
        }
    }
    report
}
