//! Project layout configuration

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::slot::Slot;
use crate::storage::settings::Settings;

/// Placeholder substituted with the slot name in path and command templates
pub const SLOT_PLACEHOLDER: &str = "{slot}";

/// Placeholder substituted with the slot port in supervisor templates
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Substitute `{slot}` and `{port}` in a template
pub fn render(template: &str, slot: Slot, port: u16) -> String {
    template
        .replace(SLOT_PLACEHOLDER, slot.as_str())
        .replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Filesystem layout of the project the orchestrator manages
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Root all relative paths resolve against
    pub root_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Resolve a path against the project root, absolute paths pass through
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Resolve a `{slot}` template against the project root
    pub fn resolve_for(&self, template: &str, slot: Slot) -> PathBuf {
        self.resolve(template.replace(SLOT_PLACEHOLDER, slot.as_str()))
    }

    pub fn state_file(&self, settings: &Settings) -> File {
        File::new(self.resolve(&settings.state_file))
    }

    pub fn proxy_config_file(&self, settings: &Settings) -> File {
        File::new(self.resolve(&settings.proxy.config_path))
    }

    pub fn proxy_docker_config_file(&self, settings: &Settings) -> File {
        File::new(self.resolve(&settings.proxy.docker_config_path))
    }

    /// Deployable unit of a slot
    pub fn slot_dir(&self, settings: &Settings, slot: Slot) -> Dir {
        Dir::new(self.resolve_for(&settings.deploy.slot_dir, slot))
    }

    /// Directories removed by the cleanup step
    pub fn cleanup_dirs(&self, settings: &Settings) -> Vec<Dir> {
        settings
            .deploy
            .cleanup_paths
            .iter()
            .map(|path| Dir::new(self.resolve(path)))
            .collect()
    }
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
