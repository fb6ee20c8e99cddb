// ABOUTME: HA role detection and the secondary-only unregister step.
// ABOUTME: Nodes without an HA controller are always single instances.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::process::{CommandSpec, ExecutionError, ProcessRunner};
use crate::types::InstanceType;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to query cluster role: {0}")]
    RoleQuery(#[source] ExecutionError),

    #[error("could not determine cluster role from controller output: {0}")]
    UnknownRole(String),

    #[error("failed to unregister secondary: {0}")]
    Unregister(#[source] ExecutionError),
}

impl ClusterError {
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            ClusterError::RoleQuery(e) | ClusterError::Unregister(e) => Some(e),
            ClusterError::UnknownRole(_) => None,
        }
    }
}

/// Queries the replication controller.
#[async_trait]
pub trait ClusterRole: Send + Sync {
    /// Whether this node is the write primary of the replicated set.
    async fn is_primary(&self) -> Result<bool, ClusterError>;

    /// Remove this node from the replicated set's membership.
    async fn unregister_secondary(&self) -> Result<(), ClusterError>;
}

/// `ClusterRole` backed by the `repmgr` CLI.
pub struct RepmgrRole {
    runner: Arc<dyn ProcessRunner>,
    repmgr: PathBuf,
    config_file: PathBuf,
    user: String,
}

impl RepmgrRole {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        repmgr: PathBuf,
        config_file: PathBuf,
        user: String,
    ) -> Self {
        Self {
            runner,
            repmgr,
            config_file,
            user,
        }
    }

    fn spec<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new(&self.repmgr)
            .arg("-f")
            .arg(self.config_file.display().to_string())
            .args(args)
            .run_as(&self.user)
    }
}

#[async_trait]
impl ClusterRole for RepmgrRole {
    async fn is_primary(&self) -> Result<bool, ClusterError> {
        let output = self
            .runner
            .run_checked("query repmgr node status", &self.spec(["node", "status"]))
            .await
            .map_err(ClusterError::RoleQuery)?;

        parse_role(&output.stdout).ok_or_else(|| ClusterError::UnknownRole(output.stdout))
    }

    async fn unregister_secondary(&self) -> Result<(), ClusterError> {
        self.runner
            .run_checked(
                "unregister standby",
                &self.spec(["standby", "unregister"]),
            )
            .await
            .map(|_| ())
            .map_err(ClusterError::Unregister)
    }
}

/// Extract the role from `repmgr node status` (`Role: "primary"`).
fn parse_role(stdout: &str) -> Option<bool> {
    stdout.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "Role" {
            return None;
        }
        match value.trim().trim_matches('"') {
            "primary" => Some(true),
            "standby" => Some(false),
            _ => None,
        }
    })
}

/// Decides which upgrade path this node takes.
pub struct ClusterRoleDetector {
    ha_enabled: bool,
    role: Arc<dyn ClusterRole>,
}

impl ClusterRoleDetector {
    pub fn new(ha_enabled: bool, role: Arc<dyn ClusterRole>) -> Self {
        Self { ha_enabled, role }
    }

    pub fn ha_enabled(&self) -> bool {
        self.ha_enabled
    }

    pub async fn detect(&self) -> Result<InstanceType, ClusterError> {
        if !self.ha_enabled {
            return Ok(InstanceType::SingleNode);
        }

        if self.role.is_primary().await? {
            Ok(InstanceType::Primary)
        } else {
            Ok(InstanceType::Secondary)
        }
    }

    /// Detach a secondary from the cluster before its data directory changes.
    ///
    /// Returns whether the node was unregistered. Primaries, single nodes and
    /// `skip_unregister` runs never call the controller.
    pub async fn prepare_secondary(
        &self,
        instance: InstanceType,
        skip_unregister: bool,
    ) -> Result<bool, ClusterError> {
        if instance != InstanceType::Secondary {
            return Ok(false);
        }

        if skip_unregister {
            tracing::info!("skipping secondary unregister as requested");
            return Ok(false);
        }

        tracing::info!("unregistering secondary from the cluster");
        self.role.unregister_secondary().await?;
        Ok(true)
    }
}
