// ABOUTME: Service start/stop/status through the supervisor CLI.
// ABOUTME: Stopping an already stopped service is a no-op.

use async_trait::async_trait;
use nonempty::NonEmpty;
use std::sync::Arc;

use crate::process::{CommandSpec, ExecutionError, ProcessRunner};
use crate::types::ServiceName;

/// Observed state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Up,
    Down,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to start {service}: {source}")]
    Start {
        service: ServiceName,
        source: ExecutionError,
    },

    #[error("failed to stop {service}: {source}")]
    Stop {
        service: ServiceName,
        source: ExecutionError,
    },

    #[error("failed to query status of {service}: {source}")]
    Status {
        service: ServiceName,
        source: ExecutionError,
    },
}

impl ServiceError {
    pub fn execution(&self) -> &ExecutionError {
        match self {
            ServiceError::Start { source, .. }
            | ServiceError::Stop { source, .. }
            | ServiceError::Status { source, .. } => source,
        }
    }
}

/// Start, stop and inspect supervised services.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn start(&self, service: &ServiceName) -> Result<(), ServiceError>;

    /// Stop a service. Must succeed if the service is already down.
    async fn stop(&self, service: &ServiceName) -> Result<(), ServiceError>;

    async fn status(&self, service: &ServiceName) -> Result<ServiceStatus, ServiceError>;
}

/// `ServiceControl` backed by a runit-style `sv` command.
pub struct SupervisorControl {
    runner: Arc<dyn ProcessRunner>,
    command: NonEmpty<String>,
}

impl SupervisorControl {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: NonEmpty<String>) -> Self {
        Self { runner, command }
    }

    fn spec(&self, action: &str, service: &ServiceName) -> CommandSpec {
        CommandSpec::from_argv(&self.command)
            .arg(action)
            .arg(service.as_str())
    }
}

#[async_trait]
impl ServiceControl for SupervisorControl {
    async fn start(&self, service: &ServiceName) -> Result<(), ServiceError> {
        tracing::info!(%service, "starting service");
        self.runner
            .run_checked(&format!("start {service}"), &self.spec("start", service))
            .await
            .map(|_| ())
            .map_err(|source| ServiceError::Start {
                service: service.clone(),
                source,
            })
    }

    async fn stop(&self, service: &ServiceName) -> Result<(), ServiceError> {
        if self.status(service).await? == ServiceStatus::Down {
            tracing::debug!(%service, "service already stopped");
            return Ok(());
        }

        tracing::info!(%service, "stopping service");
        self.runner
            .run_checked(&format!("stop {service}"), &self.spec("stop", service))
            .await
            .map(|_| ())
            .map_err(|source| ServiceError::Stop {
                service: service.clone(),
                source,
            })
    }

    async fn status(&self, service: &ServiceName) -> Result<ServiceStatus, ServiceError> {
        let action = format!("status {service}");
        let spec = self.spec("status", service);
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|source| ServiceError::Status {
                service: service.clone(),
                source: ExecutionError::Process {
                    action: action.clone(),
                    source,
                },
            })?;

        if let Some(status) = parse_status(&output.stdout) {
            return Ok(status);
        }

        let source = if output.success() {
            ExecutionError::failed(
                action,
                format!("unrecognized supervisor output: {}", output.stdout.trim()),
            )
        } else {
            ExecutionError::NonZeroExit {
                action,
                command: spec.to_string(),
                output,
            }
        };
        Err(ServiceError::Status {
            service: service.clone(),
            source,
        })
    }
}

/// `sv status` prints `run: <name>: (pid N) Ns` for a running service and
/// `down:` (or `finish:` while the finish script runs) for a stopped one.
/// Anything else, such as `fail: ... unable to change to service directory`,
/// is not a status.
fn parse_status(stdout: &str) -> Option<ServiceStatus> {
    let line = stdout.trim_start();
    if line.starts_with("run:") {
        Some(ServiceStatus::Up)
    } else if line.starts_with("down:") || line.starts_with("finish:") {
        Some(ServiceStatus::Down)
    } else {
        None
    }
}
