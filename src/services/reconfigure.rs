// ABOUTME: Configuration regeneration after binaries or data change.

use async_trait::async_trait;
use std::sync::Arc;

use crate::process::{CommandSpec, ExecutionError, ProcessRunner};

/// Re-renders service configuration files.
#[async_trait]
pub trait ConfigSystem: Send + Sync {
    async fn reconfigure(&self) -> Result<(), ExecutionError>;
}

/// `ConfigSystem` that runs a reconfigure command and checks its exit code.
pub struct CommandConfigSystem {
    runner: Arc<dyn ProcessRunner>,
    command: CommandSpec,
}

impl CommandConfigSystem {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }
}

#[async_trait]
impl ConfigSystem for CommandConfigSystem {
    async fn reconfigure(&self) -> Result<(), ExecutionError> {
        tracing::info!(command = %self.command, "regenerating configuration");
        self.runner
            .run_checked("reconfigure", &self.command)
            .await
            .map(|_| ())
    }
}
