// ABOUTME: Explicit return to the previous major version after an upgrade.
// ABOUTME: Binaries are always reverted; data only if the preserved copy exists.

use std::fs;

use super::binaries::{self, exists};
use super::context::{DirectoryPaths, RevertOptions};
use super::error::{PreconditionError, UpgradeError};
use super::lock::UpgradeLock;
use super::orchestrator::Orchestrator;
use super::probe::wait_until_ready;
use super::relocate::move_dir;
use super::state::UpgradePhase;
use crate::diagnostics::{Diagnostics, Warning};
use crate::output::Output;
use crate::process::ExecutionError;
use crate::types::Version;
use crate::versions::VersionResolver;

/// Result of a revert that at least reverted the binaries.
#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub to: Version,
    pub restored_data: bool,
}

impl Orchestrator {
    /// Put the previous major version's data directory and binaries back.
    ///
    /// When the preserved data directory is missing the binaries are still
    /// reverted, a warning is recorded and `DataNotReverted` is returned.
    pub async fn revert(
        &self,
        options: &RevertOptions,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<RevertOutcome, UpgradeError> {
        self.enter(UpgradePhase::Idle);

        let paths = DirectoryPaths::from_config(&self.config, options.tmp_dir.as_deref());
        let resolver = VersionResolver::new(&self.config.paths.manifest, &paths.data_dir);
        let previous = match options.target_version {
            Some(major) => Version::from_major(major),
            None => resolver
                .default_version()
                .map_err(PreconditionError::from)?,
        };

        if let Ok(major) = resolver.data_dir_major()
            && major == previous.major
        {
            return Err(PreconditionError::NothingToRevert(major).into());
        }

        let bin = paths.version_bin_dir(previous.major);
        if !bin.is_dir() {
            return Err(PreconditionError::TargetNotInstalled {
                major: previous.major,
                path: bin,
            }
            .into());
        }
        self.enter(UpgradePhase::PreconditionsChecked);

        let _lock =
            UpgradeLock::acquire(&self.config.paths.state_dir, "revert-pg-upgrade", diag)?;

        output.progress(&format!("Reverting to PostgreSQL {previous}"));
        output.progress("  → Enabling maintenance mode...");
        let maintenance = self.maintenance();
        let snapshot = match maintenance.enable(&self.excluded_services()).await {
            Ok(snapshot) => snapshot,
            Err((snapshot, e)) => {
                for warning in maintenance.disable(snapshot).await {
                    diag.warn(warning);
                }
                return Err(e.into());
            }
        };
        self.enter(UpgradePhase::MaintenanceEnabled);

        let result = self.restore(&paths, &previous, output).await;

        output.progress("  → Disabling maintenance mode...");
        for warning in maintenance.disable(snapshot).await {
            diag.warn(warning);
        }
        self.enter(UpgradePhase::MaintenanceDisabled);

        let restored_data = result.map_err(UpgradeError::Execution)?;
        if !restored_data {
            let path = paths.temp_data_dir(previous.major);
            diag.warn(Warning::data_not_reverted(format!(
                "binaries now point at PostgreSQL {previous} but {} does not exist, so the data \
                 directory was not reverted and the database was left stopped; restore the data \
                 directory from backup",
                path.display()
            )));
            return Err(UpgradeError::DataNotReverted {
                major: previous.major,
                path,
            });
        }

        self.enter(UpgradePhase::Reverted);
        Ok(RevertOutcome {
            to: previous,
            restored_data,
        })
    }

    /// Returns whether the preserved data directory was moved back.
    async fn restore(
        &self,
        paths: &DirectoryPaths,
        previous: &Version,
        output: &Output,
    ) -> Result<bool, ExecutionError> {
        let service = &self.config.database.service;

        output.progress("  → Stopping database...");
        self.host.services.stop(service).await?;

        let preserved = paths.temp_data_dir(previous.major);
        let restored = exists(&preserved);
        if restored {
            output.progress("  → Restoring preserved data directory...");
            let action = "restore preserved data directory";
            if exists(&paths.data_dir) {
                fs::remove_dir_all(&paths.data_dir)
                    .map_err(|e| ExecutionError::io(action, &paths.data_dir, e))?;
            }
            move_dir(&preserved, &paths.data_dir)
                .map_err(|e| ExecutionError::io(action, &preserved, e))?;
            tracing::info!(from = %preserved.display(), "restored data directory");
        }

        output.progress("  → Relinking binaries...");
        binaries::link_version(paths, previous.major)?;
        binaries::verify_links(paths, previous.major)?;

        if !restored {
            tracing::warn!(
                major = previous.major,
                "data directory not reverted, leaving database stopped"
            );
            return Ok(false);
        }

        output.progress("  → Starting database...");
        self.host.services.start(service).await?;
        wait_until_ready(
            self.host.runner.as_ref(),
            paths,
            previous.major,
            &self.config.database,
            &self.config.timeouts,
        )
        .await?;

        Ok(restored)
    }
}
