// ABOUTME: High-availability controller settings.
// ABOUTME: When disabled the node is always treated as a single instance.

use crate::types::ServiceName;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct HaConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Replication manager daemon supervised on HA nodes.
    #[serde(default = "default_controller_service")]
    pub controller_service: ServiceName,

    #[serde(default = "default_repmgr")]
    pub repmgr: PathBuf,

    #[serde(default = "default_repmgr_config")]
    pub repmgr_config: PathBuf,
}

fn default_controller_service() -> ServiceName {
    ServiceName::from_static("repmgrd")
}

fn default_repmgr() -> PathBuf {
    PathBuf::from("/opt/omnibus/embedded/bin/repmgr")
}

fn default_repmgr_config() -> PathBuf {
    PathBuf::from("/var/opt/omnibus/postgresql/repmgr.conf")
}

impl Default for HaConfig {
    fn default() -> Self {
        HaConfig {
            enabled: false,
            controller_service: default_controller_service(),
            repmgr: default_repmgr(),
            repmgr_config: default_repmgr_config(),
        }
    }
}
