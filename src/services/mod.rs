// ABOUTME: Collaborator capabilities consumed by the upgrade workflow.
// ABOUTME: Service supervision, HA role queries, and configuration regeneration.

mod cluster;
mod control;
mod reconfigure;

pub use cluster::{ClusterError, ClusterRole, ClusterRoleDetector, RepmgrRole};
pub use control::{ServiceControl, ServiceError, ServiceStatus, SupervisorControl};
pub use reconfigure::{CommandConfigSystem, ConfigSystem};
