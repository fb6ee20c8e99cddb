// ABOUTME: Immutable per-run context and the directory layout it implies.
// ABOUTME: Stages derive new contexts instead of mutating shared fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, DatabaseConfig, TimeoutsConfig};
use crate::types::{InstanceType, Version};

/// Data, scratch, and binary directories for one installation.
#[derive(Debug, Clone)]
pub struct DirectoryPaths {
    /// Live cluster; named identically for every major version.
    pub data_dir: PathBuf,
    /// `<prefix>.<major>` names the scratch directories.
    pub temp_dir_prefix: PathBuf,
    pub install_root: PathBuf,
    pub bin_dir: PathBuf,
}

impl DirectoryPaths {
    /// Layout from configuration, optionally relocating scratch directories
    /// under `tmp_dir`.
    pub fn from_config(config: &Config, tmp_dir: Option<&Path>) -> Self {
        let data_dir = config.paths.data_dir.clone();
        let temp_dir_prefix = match (tmp_dir, data_dir.file_name()) {
            (Some(tmp), Some(name)) => tmp.join(name),
            _ => data_dir.clone(),
        };

        Self {
            data_dir,
            temp_dir_prefix,
            install_root: config.paths.install_root.clone(),
            bin_dir: config.paths.bin_dir.clone(),
        }
    }

    /// Scratch directory for a major version (`<prefix>.<major>`).
    pub fn temp_data_dir(&self, major: u32) -> PathBuf {
        let mut name = self.temp_dir_prefix.clone().into_os_string();
        name.push(format!(".{major}"));
        PathBuf::from(name)
    }

    /// Binaries shipped for one major version.
    pub fn version_bin_dir(&self, major: u32) -> PathBuf {
        self.install_root.join(major.to_string()).join("bin")
    }

    /// Directory the scratch directories are created in.
    pub fn temp_parent(&self) -> &Path {
        self.temp_dir_prefix.parent().unwrap_or(Path::new("/"))
    }
}

/// Everything a single upgrade run needs to know, fixed at the start.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    pub running_version: Version,
    pub target_version: Version,
    pub instance_type: InstanceType,
    pub paths: DirectoryPaths,
    pub database: DatabaseConfig,
    pub timeouts: TimeoutsConfig,
    pub wait_before_upgrade: bool,
    pub skip_unregister: bool,
}

impl UpgradeContext {
    /// Where the previous cluster is kept after the swap.
    pub fn preserved_data_dir(&self) -> PathBuf {
        self.paths.temp_data_dir(self.running_version.major)
    }

    /// Where the new cluster is built before the swap.
    pub fn new_data_dir(&self) -> PathBuf {
        self.paths.temp_data_dir(self.target_version.major)
    }

    pub fn command_timeout(&self) -> Duration {
        self.timeouts.command
    }
}

/// Flags for `pg-upgrade`.
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    pub tmp_dir: Option<PathBuf>,
    pub wait: bool,
    pub skip_unregister: bool,
    pub target_version: Option<u32>,
    pub timeout: Option<Duration>,
    pub skip_disk_check: bool,
}

/// Flags for `revert-pg-upgrade`.
#[derive(Debug, Clone, Default)]
pub struct RevertOptions {
    pub tmp_dir: Option<PathBuf>,
    pub target_version: Option<u32>,
}
