//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::SlotError;
use crate::filesys::file::File;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// How a directory move finally succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStrategy {
    /// Renamed on the given attempt (1-based)
    Renamed { attempt: u32 },
    /// Renames were exhausted; copied recursively then deleted the source
    Copied,
}

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), SlotError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents.
    ///
    /// Read-only entries are made writable and the removal retried once.
    pub async fn delete(&self) -> Result<(), SlotError> {
        if !self.exists().await {
            return Ok(());
        }

        if let Err(e) = fs::remove_dir_all(&self.path).await {
            debug!("Removing {} failed ({}), clearing read-only flags", self.path.display(), e);
            clear_readonly(&self.path).await;
            fs::remove_dir_all(&self.path).await.map_err(|e| {
                SlotError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to delete directory {}: {}", self.path.display(), e),
                ))
            })?;
        }
        Ok(())
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively copy this directory's contents into `dest`, replacing it
    pub async fn copy_to(&self, dest: &Dir) -> Result<(), SlotError> {
        if !self.exists().await {
            return Err(SlotError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Source directory does not exist: {}", self.path.display()),
            )));
        }
        dest.delete().await?;

        let mut pending = vec![(self.path.clone(), dest.path.clone())];
        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst).await?;
            let mut entries = fs::read_dir(&src).await?;
            while let Some(entry) = entries.next_entry().await? {
                let from = entry.path();
                let to = dst.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push((from, to));
                } else {
                    fs::copy(&from, &to).await?;
                }
            }
        }
        Ok(())
    }

    /// Move this directory to `dest`, replacing whatever is there.
    ///
    /// Each attempt deletes `dest` then renames. Up to `attempts` tries are made
    /// with exponential backoff between them; after that the directory is copied
    /// recursively and the source deleted. Only a failed copy is an error.
    pub async fn move_to(
        &self,
        dest: &Dir,
        attempts: u32,
        backoff: &CooldownOptions,
    ) -> Result<MoveStrategy, SlotError> {
        for attempt in 0..attempts {
            match self.try_rename(dest).await {
                Ok(()) => return Ok(MoveStrategy::Renamed { attempt: attempt + 1 }),
                Err(e) if attempt + 1 < attempts => {
                    let delay = calc_exp_backoff(backoff, attempt);
                    warn!(
                        "Move attempt {}/{} of {} failed: {}. Retrying in {:?}...",
                        attempt + 1,
                        attempts,
                        self.path.display(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Move attempt {}/{} of {} failed: {}",
                        attempt + 1,
                        attempts,
                        self.path.display(),
                        e
                    );
                }
            }
        }

        info!(
            "Falling back to copy for {} -> {}",
            self.path.display(),
            dest.path.display()
        );
        self.copy_to(dest).await?;
        self.delete().await?;
        Ok(MoveStrategy::Copied)
    }

    async fn try_rename(&self, dest: &Dir) -> Result<(), SlotError> {
        dest.delete().await?;
        if let Some(parent) = dest.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&self.path, &dest.path).await?;
        Ok(())
    }
}

async fn clear_readonly(root: &Path) {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(meta) = fs::metadata(&path).await else {
                continue;
            };
            if meta.is_dir() {
                pending.push(path.clone());
            }
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(&path, perms).await;
            }
        }
    }
}
