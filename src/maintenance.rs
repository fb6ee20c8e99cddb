// ABOUTME: Maintenance mode: deploy page plus stopping non-essential services.
// ABOUTME: Records which services were running so exactly those are restarted.

use nonempty::NonEmpty;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::diagnostics::Warning;
use crate::process::{CommandSpec, ExecutionError, ProcessRunner};
use crate::services::{ServiceControl, ServiceError, ServiceStatus};
use crate::types::ServiceName;

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("failed to bring up the deploy page: {0}")]
    DeployPage(#[source] ExecutionError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Which services were running when maintenance mode began.
///
/// Handed back to [`MaintenanceMode::disable`], which consumes it, so a run
/// cannot leave maintenance mode twice.
#[derive(Debug, Default)]
#[must_use = "the snapshot must be passed to MaintenanceMode::disable"]
pub struct ServiceSnapshot {
    was_running: BTreeMap<ServiceName, bool>,
}

impl ServiceSnapshot {
    pub fn was_running(&self, service: &ServiceName) -> bool {
        self.was_running.get(service).copied().unwrap_or(false)
    }

    /// Services to restart when maintenance mode ends.
    pub fn running(&self) -> impl Iterator<Item = &ServiceName> {
        self.was_running
            .iter()
            .filter(|(_, running)| **running)
            .map(|(name, _)| name)
    }

    fn record(&mut self, service: &ServiceName, running: bool) {
        self.was_running.insert(service.clone(), running);
    }
}

/// Toggles the deploy page and stops everything not needed to serve it.
pub struct MaintenanceMode {
    runner: Arc<dyn ProcessRunner>,
    services: Arc<dyn ServiceControl>,
    deploy_page: NonEmpty<String>,
    managed: Vec<ServiceName>,
}

impl MaintenanceMode {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        services: Arc<dyn ServiceControl>,
        deploy_page: NonEmpty<String>,
        managed: Vec<ServiceName>,
    ) -> Self {
        Self {
            runner,
            services,
            deploy_page,
            managed,
        }
    }

    /// Raise the deploy page and stop every managed service not in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns the partial snapshot with the error so the caller can still
    /// restore whatever was already stopped.
    pub async fn enable(
        &self,
        excluded: &BTreeSet<ServiceName>,
    ) -> Result<ServiceSnapshot, (ServiceSnapshot, MaintenanceError)> {
        let mut snapshot = ServiceSnapshot::default();

        tracing::info!("enabling deploy page");
        if let Err(e) = self
            .runner
            .run_checked("deploy page up", &self.deploy_page_spec("up"))
            .await
        {
            return Err((snapshot, MaintenanceError::DeployPage(e)));
        }

        for service in self.managed.iter().filter(|s| !excluded.contains(*s)) {
            let status = match self.services.status(service).await {
                Ok(status) => status,
                Err(e) => return Err((snapshot, e.into())),
            };

            let running = status == ServiceStatus::Up;
            snapshot.record(service, running);

            if running && let Err(e) = self.services.stop(service).await {
                return Err((snapshot, e.into()));
            }
        }

        Ok(snapshot)
    }

    /// Lower the deploy page and restart what the snapshot saw running.
    ///
    /// Best effort: every failure is returned as a warning and the remaining
    /// services are still started.
    pub async fn disable(&self, snapshot: ServiceSnapshot) -> Vec<Warning> {
        let mut warnings = Vec::new();

        tracing::info!("disabling deploy page");
        if let Err(e) = self
            .runner
            .run_checked("deploy page down", &self.deploy_page_spec("down"))
            .await
        {
            warnings.push(Warning::maintenance(format!(
                "failed to take down the deploy page, run `{} down` manually: {}",
                self.deploy_page.iter().cloned().collect::<Vec<_>>().join(" "),
                e.report()
            )));
        }

        for service in snapshot.running() {
            if let Err(e) = self.services.start(service).await {
                warnings.push(Warning::maintenance(format!(
                    "failed to restart {service} after maintenance: {}",
                    e.execution().report()
                )));
            }
        }

        warnings
    }

    fn deploy_page_spec(&self, state: &str) -> CommandSpec {
        CommandSpec::from_argv(&self.deploy_page).arg(state)
    }
}
