// ABOUTME: State transition methods for the data directory migration.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use super::binaries;
use super::context::UpgradeContext;
use super::host::Host;
use super::locale;
use super::migration::Migration;
use super::probe::wait_until_ready;
use super::relocate::move_dir;
use super::state::{
    Completed, Initialized, Linked, Migrated, Pending, Running, Staged, Stopped, Swapped,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::process::{CommandSpec, ExecutionError, ProcessRunner};
use crate::services::{ServiceControl, ServiceStatus};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Migration<T>, (Migration<S>, ExecutionError)>;

// =============================================================================
// Pending -> Stopped
// =============================================================================

impl Migration<Pending> {
    /// Record the running cluster's locale so the new cluster can match it.
    ///
    /// Must run while the old server still accepts connections.
    pub async fn capture_locale(mut self, runner: &dyn ProcessRunner) -> Result<Self, ExecutionError> {
        self.locale = Some(locale::capture(&self.ctx, runner).await?);
        Ok(self)
    }

    /// Stop the database and confirm the supervisor reports it down.
    pub async fn stop_database(
        self,
        services: &dyn ServiceControl,
    ) -> Result<Migration<Stopped>, ExecutionError> {
        let service = &self.ctx.database.service;

        tracing::info!(%service, "stopping database");
        services.stop(service).await?;

        match services.status(service).await? {
            ServiceStatus::Down => Ok(self.transition()),
            ServiceStatus::Up => Err(ExecutionError::failed(
                "stop database",
                format!("{service} is still running after stop"),
            )),
        }
    }
}

// =============================================================================
// Stopped -> Linked
// =============================================================================

impl Migration<Stopped> {
    /// Point the shared bin directory at the target version's binaries.
    pub fn link_binaries(self) -> Result<Migration<Linked>, ExecutionError> {
        let major = self.ctx.target_version.major;
        let linked = binaries::link_version(&self.ctx.paths, major)?;
        binaries::verify_links(&self.ctx.paths, major)?;

        tracing::info!(major, linked, "linked target binaries");
        Ok(self.transition())
    }
}

// =============================================================================
// Linked -> Staged
// =============================================================================

impl Migration<Linked> {
    /// Create `<prefix>.<target>` and hand it to the database user.
    pub async fn create_temp_dir(
        self,
        runner: &dyn ProcessRunner,
    ) -> Result<Migration<Staged>, ExecutionError> {
        let dir = self.ctx.new_data_dir();
        let action = "create scratch data directory";

        fs::create_dir_all(&dir).map_err(|e| ExecutionError::io(action, &dir, e))?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| ExecutionError::io(action, &dir, e))?;

        let chown = CommandSpec::new("chown")
            .arg(&self.ctx.database.user)
            .arg(dir.display().to_string());
        runner.run_checked(action, &chown).await?;

        tracing::info!(path = %dir.display(), "created scratch data directory");
        Ok(self.transition())
    }
}

// =============================================================================
// Staged -> Initialized
// =============================================================================

impl Migration<Staged> {
    /// Run the target version's `initdb` in the scratch directory.
    ///
    /// Passes the captured locale when there is one; secondaries skip the
    /// capture and get initdb's defaults.
    pub async fn initialize_cluster(
        self,
        runner: &dyn ProcessRunner,
    ) -> Result<Migration<Initialized>, ExecutionError> {
        let ctx = &self.ctx;
        let initdb = ctx
            .paths
            .version_bin_dir(ctx.target_version.major)
            .join("initdb");

        let mut spec = CommandSpec::new(initdb)
            .arg("-D")
            .arg(ctx.new_data_dir().display().to_string())
            .run_as(&ctx.database.user)
            .timeout(ctx.command_timeout());
        if let Some(locale) = &self.locale {
            spec = spec.args(locale.initdb_args());
        }

        runner.run_checked("initialize new cluster", &spec).await?;
        tracing::info!(major = ctx.target_version.major, "initialized new cluster");
        Ok(self.transition())
    }
}

// =============================================================================
// Initialized -> Migrated
// =============================================================================

impl Migration<Initialized> {
    /// Run `pg_upgrade` from the live data directory into the new cluster.
    pub async fn migrate_data(
        self,
        runner: &dyn ProcessRunner,
    ) -> Result<Migration<Migrated>, ExecutionError> {
        let ctx = &self.ctx;
        let old_bin = ctx.paths.version_bin_dir(ctx.running_version.major);
        let new_bin = ctx.paths.version_bin_dir(ctx.target_version.major);

        let spec = CommandSpec::new(new_bin.join("pg_upgrade"))
            .arg("-b")
            .arg(old_bin.display().to_string())
            .arg("-B")
            .arg(new_bin.display().to_string())
            .arg("-d")
            .arg(ctx.paths.data_dir.display().to_string())
            .arg("-D")
            .arg(ctx.new_data_dir().display().to_string())
            .run_as(&ctx.database.user)
            .current_dir(ctx.paths.temp_parent())
            .timeout(ctx.command_timeout());

        tracing::info!(
            from = %ctx.running_version,
            to = %ctx.target_version,
            "migrating data"
        );
        runner.run_checked("migrate data", &spec).await?;
        Ok(self.transition())
    }

    /// Secondaries are re-cloned from the primary; the empty cluster is
    /// swapped in as-is.
    pub fn skip_migration(self) -> Migration<Migrated> {
        tracing::info!("secondary node, skipping data migration");
        self.transition()
    }
}

// =============================================================================
// Migrated -> Swapped
// =============================================================================

impl Migration<Migrated> {
    /// Move the live directory to `<prefix>.<running>` and the new cluster
    /// into its place.
    ///
    /// If the second move fails the first is undone, leaving the live
    /// directory where it was.
    pub fn swap_directories(self) -> TransitionResult<Swapped, Migrated> {
        let data_dir = self.ctx.paths.data_dir.clone();
        let preserved = self.ctx.preserved_data_dir();
        let new_dir = self.ctx.new_data_dir();

        if let Err(e) = move_dir(&data_dir, &preserved) {
            let err = ExecutionError::io("preserve old data directory", &data_dir, e);
            return Err((self, err));
        }

        if let Err(e) = move_dir(&new_dir, &data_dir) {
            let err = ExecutionError::io("move new cluster into place", &new_dir, e);
            match move_dir(&preserved, &data_dir) {
                Ok(()) => tracing::warn!(
                    path = %data_dir.display(),
                    "swap failed, old data directory put back"
                ),
                Err(undo) => tracing::error!(
                    path = %preserved.display(),
                    error = %undo,
                    "swap failed and old data directory could not be put back"
                ),
            }
            return Err((self, err));
        }

        tracing::info!(
            live = %data_dir.display(),
            preserved = %preserved.display(),
            "swapped data directories"
        );
        Ok(self.transition())
    }
}

// =============================================================================
// Swapped -> Running
// =============================================================================

impl Migration<Swapped> {
    /// Regenerate configuration, start the new server and wait for it.
    ///
    /// A failed second reconfigure is only a warning: the server is already
    /// up on the new version.
    pub async fn start(self, host: &Host, diag: &mut Diagnostics) -> TransitionResult<Running, Swapped> {
        if let Err(e) = host.config_system.reconfigure().await {
            return Err((self, e));
        }

        let service = self.ctx.database.service.clone();
        tracing::info!(%service, "starting database on new version");
        if let Err(e) = host.services.start(&service).await {
            return Err((self, e.into()));
        }

        let ready = wait_until_ready(
            host.runner.as_ref(),
            &self.ctx.paths,
            self.ctx.target_version.major,
            &self.ctx.database,
            &self.ctx.timeouts,
        )
        .await;
        if let Err(e) = ready {
            return Err((self, e));
        }

        if let Err(e) = host.config_system.reconfigure().await {
            diag.warn(Warning::reconfigure_failed(format!(
                "configuration was not regenerated after the upgrade, run reconfigure manually: {}",
                e.report()
            )));
        }

        Ok(self.transition())
    }
}

// =============================================================================
// Running -> Completed
// =============================================================================

impl Migration<Running> {
    /// Refresh planner statistics on the new cluster.
    ///
    /// Failures are recorded with the command to run by hand; the upgrade
    /// itself has already succeeded.
    pub async fn analyze(self, runner: &dyn ProcessRunner, diag: &mut Diagnostics) -> Migration<Completed> {
        let ctx = &self.ctx;
        let spec = CommandSpec::new(
            ctx.paths
                .version_bin_dir(ctx.target_version.major)
                .join("vacuumdb"),
        )
        .args(["--all", "--analyze-in-stages"])
        .arg("-h")
        .arg(ctx.database.host.display().to_string())
        .arg("-p")
        .arg(ctx.database.port.to_string())
        .run_as(&ctx.database.user)
        .timeout(ctx.command_timeout());

        tracing::info!("analyzing new cluster");
        if let Err(e) = runner.run_checked("analyze new cluster", &spec).await {
            diag.warn(Warning::analyze_failed(format!(
                "statistics were not refreshed; run `{spec}` as {} to refresh them: {}",
                ctx.database.user,
                e.report()
            )));
        }

        self.transition()
    }

    /// End the run without analyzing (secondaries).
    pub fn finish(self) -> UpgradeContext {
        self.ctx
    }
}

impl Migration<Completed> {
    pub fn finish(self) -> UpgradeContext {
        self.ctx
    }
}
