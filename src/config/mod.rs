// ABOUTME: Configuration types and loading for the upgrader.
// ABOUTME: Reads a YAML file with per-section defaults matching a standard install.

mod database;
mod ha;
mod paths;
mod services;
mod timeouts;

pub use database::DatabaseConfig;
pub use ha::HaConfig;
pub use paths::PathsConfig;
pub use services::ServicesConfig;
pub use timeouts::TimeoutsConfig;

use crate::error::{Error, Result};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pg-upgrader/config.yml";
pub const CONFIG_ENV_VAR: &str = "PG_UPGRADER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    /// Service supervisor CLI; `start|stop|status <service>` is appended.
    #[serde(default = "default_supervisor")]
    pub supervisor: NonEmpty<String>,

    /// Deploy page toggle; `up` or `down` is appended.
    #[serde(default = "default_deploy_page")]
    pub deploy_page: NonEmpty<String>,

    /// Regenerates service configuration files.
    #[serde(default = "default_reconfigure")]
    pub reconfigure: NonEmpty<String>,

    /// Prefix used to run database tools as the database superuser.
    #[serde(default = "default_privilege_drop")]
    pub privilege_drop: Vec<String>,

    #[serde(default)]
    pub ha: HaConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

fn default_supervisor() -> NonEmpty<String> {
    NonEmpty::new("/opt/omnibus/embedded/bin/sv".to_string())
}

fn default_deploy_page() -> NonEmpty<String> {
    NonEmpty::from((
        "/opt/omnibus/bin/omnibus-ctl".to_string(),
        vec!["deploy-page".to_string()],
    ))
}

fn default_reconfigure() -> NonEmpty<String> {
    NonEmpty::from((
        "/opt/omnibus/bin/omnibus-ctl".to_string(),
        vec!["reconfigure".to_string()],
    ))
}

fn default_privilege_drop() -> Vec<String> {
    vec!["/opt/omnibus/embedded/bin/chpst".to_string(), "-u".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig::default(),
            database: DatabaseConfig::default(),
            services: ServicesConfig::default(),
            supervisor: default_supervisor(),
            deploy_page: default_deploy_page(),
            reconfigure: default_reconfigure(),
            privilege_drop: default_privilege_drop(),
            ha: HaConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Resolve the configuration to use for this run.
    ///
    /// An explicit path (flag, then environment variable) must exist. The
    /// default location is optional and falls back to built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(&PathBuf::from(path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.is_file() {
            Self::load(default_path)
        } else {
            tracing::debug!("no configuration file at {DEFAULT_CONFIG_PATH}, using defaults");
            Ok(Config::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if !self
            .services
            .managed
            .iter()
            .any(|s| s == &self.database.service)
        {
            return Err(Error::InvalidConfig(format!(
                "database service '{}' must be listed in services.managed",
                self.database.service
            )));
        }

        if self.timeouts.start_attempts == 0 {
            return Err(Error::InvalidConfig(
                "timeouts.start_attempts must be at least 1".to_string(),
            ));
        }

        if !self.paths.data_dir.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "paths.data_dir must be absolute: {}",
                self.paths.data_dir.display()
            )));
        }

        Ok(())
    }
}
