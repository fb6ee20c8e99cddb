// ABOUTME: Filesystem layout of the database installation.
// ABOUTME: Live data dir, versioned install root, shared bin links, manifest, state dir.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Live data directory; its name never changes across versions.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Holds one `<major>/bin` directory per installed version.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Shared directory of version-agnostic symlinks.
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Lock files live here.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/opt/omnibus/postgresql/data")
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/opt/omnibus/embedded/postgresql")
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("/opt/omnibus/embedded/bin")
}

fn default_manifest() -> PathBuf {
    PathBuf::from("/opt/omnibus/version-manifest.json")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/opt/omnibus/pg-upgrader")
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data_dir: default_data_dir(),
            install_root: default_install_root(),
            bin_dir: default_bin_dir(),
            manifest: default_manifest(),
            state_dir: default_state_dir(),
        }
    }
}
