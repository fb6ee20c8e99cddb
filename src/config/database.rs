// ABOUTME: Connection and service settings for the managed database.

use crate::types::ServiceName;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_service")]
    pub service: ServiceName,

    /// System user that owns the data directory and runs database tools.
    #[serde(default = "default_user")]
    pub user: String,

    /// Unix socket directory used by `psql` and `pg_isready`.
    #[serde(default = "default_host")]
    pub host: PathBuf,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_service() -> ServiceName {
    ServiceName::from_static("postgresql")
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_host() -> PathBuf {
    PathBuf::from("/var/opt/omnibus/postgresql")
}

fn default_port() -> u16 {
    5432
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            service: default_service(),
            user: default_user(),
            host: default_host(),
            port: default_port(),
        }
    }
}
