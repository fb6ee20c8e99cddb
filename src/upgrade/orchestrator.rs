// ABOUTME: Top-level upgrade state machine: preconditions, maintenance, migration, rollback.
// ABOUTME: Maintenance mode is left exactly once per run, whatever the outcome.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use super::context::{DirectoryPaths, UpgradeContext, UpgradeOptions};
use super::error::{RollbackError, UpgradeError};
use super::host::Host;
use super::lock::UpgradeLock;
use super::migration::Migration;
use super::preconditions::check_preconditions;
use super::rollback::{RollbackReport, rollback};
use super::state::UpgradePhase;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::maintenance::MaintenanceMode;
use crate::output::Output;
use crate::services::ClusterRoleDetector;
use crate::types::{InstanceType, ServiceName, Version};

/// Result of a successful upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeOutcome {
    pub from: Version,
    pub to: Version,
    pub instance_type: InstanceType,
}

/// Sequences one upgrade or revert run against a host.
pub struct Orchestrator {
    pub(super) config: Config,
    pub(super) host: Host,
    pub(super) cluster: ClusterRoleDetector,
    phase: Cell<UpgradePhase>,
    unregistered: Cell<bool>,
}

impl Orchestrator {
    pub fn new(config: Config, host: Host, cluster: ClusterRoleDetector) -> Self {
        Self {
            config,
            host,
            cluster,
            phase: Cell::new(UpgradePhase::Idle),
            unregistered: Cell::new(false),
        }
    }

    /// Phase the last run reached.
    pub fn phase(&self) -> UpgradePhase {
        self.phase.get()
    }

    pub(super) fn enter(&self, phase: UpgradePhase) {
        tracing::debug!(from = %self.phase.get(), to = %phase, "phase change");
        self.phase.set(phase);
    }

    /// On HA nodes the replication manager is stopped too, so it cannot
    /// fail over while the database is down.
    pub(super) fn maintenance(&self) -> MaintenanceMode {
        let mut managed: Vec<ServiceName> = self.config.services.managed.iter().cloned().collect();
        let controller = &self.config.ha.controller_service;
        if self.cluster.ha_enabled() && !managed.contains(controller) {
            managed.push(controller.clone());
        }

        MaintenanceMode::new(
            self.host.runner.clone(),
            self.host.services.clone(),
            self.config.deploy_page.clone(),
            managed,
        )
    }

    /// Services left running in maintenance mode: the database itself and
    /// whatever serves the deploy page.
    pub(super) fn excluded_services(&self) -> BTreeSet<ServiceName> {
        let mut excluded: BTreeSet<_> = self.config.services.keep_running.iter().cloned().collect();
        excluded.insert(self.config.database.service.clone());
        excluded
    }

    /// Upgrade the data directory to the target major version.
    ///
    /// `shutdown` resolving interrupts the run. Before maintenance mode that
    /// is a clean abort; once the database has been touched it rolls back.
    pub async fn upgrade<F>(
        &self,
        options: &UpgradeOptions,
        shutdown: F,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<UpgradeOutcome, UpgradeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.enter(UpgradePhase::Idle);
        self.unregistered.set(false);

        let paths = DirectoryPaths::from_config(&self.config, options.tmp_dir.as_deref());
        output.progress("Checking preconditions...");
        let versions = check_preconditions(
            &self.config,
            &paths,
            options,
            &self.host,
            self.cluster.ha_enabled(),
        )
        .await?;
        self.enter(UpgradePhase::PreconditionsChecked);

        let _lock = UpgradeLock::acquire(&self.config.paths.state_dir, "pg-upgrade", diag)?;

        let mut timeouts = self.config.timeouts.clone();
        if let Some(timeout) = options.timeout {
            timeouts.command = timeout;
        }

        if options.wait {
            output.progress(&format!(
                "Waiting {}s before upgrading; interrupt now to abort",
                timeouts.settle_wait.as_secs()
            ));
            tokio::select! {
                () = tokio::time::sleep(timeouts.settle_wait) => {}
                () = &mut shutdown => return Err(UpgradeError::Interrupted),
            }
        }

        let instance_type = self.cluster.detect().await?;
        output.progress(&format!(
            "Upgrading PostgreSQL {} to {} ({instance_type})",
            versions.running, versions.target
        ));

        let ctx = UpgradeContext {
            running_version: versions.running,
            target_version: versions.target,
            instance_type,
            paths,
            database: self.config.database.clone(),
            timeouts,
            wait_before_upgrade: options.wait,
            skip_unregister: options.skip_unregister,
        };

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

        let result = self
            .run_migration(ctx, shutdown.as_mut(), output, diag)
            .await;

        output.progress("  → Disabling maintenance mode...");
        for warning in maintenance.disable(snapshot).await {
            diag.warn(warning);
        }
        if self.phase() != UpgradePhase::Reverted {
            self.enter(UpgradePhase::MaintenanceDisabled);
        }

        match result {
            Ok(ctx) => {
                if ctx.instance_type == InstanceType::Secondary {
                    diag.warn(Warning::secondary_follow_up(format!(
                        "this secondary now holds an empty PostgreSQL {} cluster; re-clone it from \
                         the upgraded primary with `{repmgr} -f {conf} standby clone` and then \
                         `{repmgr} -f {conf} standby register`",
                        ctx.target_version.major,
                        repmgr = self.config.ha.repmgr.display(),
                        conf = self.config.ha.repmgr_config.display(),
                    )));
                }
                self.enter(UpgradePhase::Done);
                Ok(UpgradeOutcome {
                    from: ctx.running_version,
                    to: ctx.target_version,
                    instance_type: ctx.instance_type,
                })
            }
            Err(e) => {
                if self.unregistered.get() {
                    diag.warn(Warning::secondary_follow_up(format!(
                        "this node was unregistered from the cluster before the upgrade failed; \
                         re-register it with `{} -f {} standby register --force`",
                        self.config.ha.repmgr.display(),
                        self.config.ha.repmgr_config.display(),
                    )));
                }
                Err(e)
            }
        }
    }

    /// Race the migration against `shutdown`, rolling back an interrupted
    /// run that already touched the database.
    async fn run_migration<F>(
        &self,
        ctx: UpgradeContext,
        shutdown: Pin<&mut F>,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<UpgradeContext, UpgradeError>
    where
        F: Future<Output = ()>,
    {
        let steps = self.migrate(ctx.clone(), output, diag);
        tokio::select! {
            result = steps => result,
            () = shutdown => {
                tracing::warn!(phase = %self.phase(), "interrupted");
                if self.phase().touched_database() || self.phase() == UpgradePhase::RollingBack {
                    output.progress("  → Interrupted, rolling back...");
                    Err(self.roll_back(&ctx, UpgradeError::Interrupted).await)
                } else {
                    Err(UpgradeError::Interrupted)
                }
            }
        }
    }

    /// Drive the data directory migration for this node's role.
    async fn migrate(
        &self,
        ctx: UpgradeContext,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<UpgradeContext, UpgradeError> {
        let host = &self.host;
        let runner = host.runner.as_ref();
        let secondary = !ctx.instance_type.migrates_in_place();

        if self
            .cluster
            .prepare_secondary(ctx.instance_type, ctx.skip_unregister)
            .await?
        {
            self.unregistered.set(true);
        }
        if secondary {
            self.enter(UpgradePhase::SecondaryPrepared);
        }

        let migration = Migration::new(ctx.clone());
        let migration = if secondary {
            migration
        } else {
            output.progress("  → Capturing cluster locale...");
            migration
                .capture_locale(runner)
                .await
                .map_err(UpgradeError::Execution)?
        };

        self.enter(UpgradePhase::PreUpgrade);
        output.progress("  → Stopping database and preparing new cluster...");
        let prepared = async {
            let migration = migration.stop_database(host.services.as_ref()).await?;
            let migration = migration.link_binaries()?;
            let migration = migration.create_temp_dir(runner).await?;
            migration.initialize_cluster(runner).await
        }
        .await;
        let initialized = match prepared {
            Ok(migration) => migration,
            Err(e) => return Err(self.roll_back(&ctx, UpgradeError::Execution(e)).await),
        };

        let migrated = if secondary {
            initialized.skip_migration()
        } else {
            output.progress("  → Migrating data...");
            match initialized.migrate_data(runner).await {
                Ok(migration) => migration,
                Err(e) => {
                    return Err(self.roll_back(&ctx, UpgradeError::FatalMigration(e)).await);
                }
            }
        };
        self.enter(UpgradePhase::Migrated);

        let swapped = match migrated.swap_directories() {
            Ok(migration) => migration,
            Err((migration, e)) => {
                self.enter(UpgradePhase::RollingBack);
                let report = migration.rollback(host).await;
                return Err(self.rolled_back(report, UpgradeError::FatalMigration(e)));
            }
        };
        self.enter(UpgradePhase::PostUpgrade);

        output.progress("  → Starting database on the new version...");
        let running = match swapped.start(host, diag).await {
            Ok(migration) => migration,
            Err((migration, e)) => {
                self.enter(UpgradePhase::RollingBack);
                let report = migration.rollback(host).await;
                return Err(self.rolled_back(report, UpgradeError::FatalMigration(e)));
            }
        };

        if secondary {
            Ok(running.finish())
        } else {
            output.progress("  → Analyzing new cluster...");
            Ok(running.analyze(runner, diag).await.finish())
        }
    }

    async fn roll_back(&self, ctx: &UpgradeContext, cause: UpgradeError) -> UpgradeError {
        self.enter(UpgradePhase::RollingBack);
        let report = rollback(ctx, &self.host).await;
        self.rolled_back(report, cause)
    }

    fn rolled_back(
        &self,
        report: Result<RollbackReport, RollbackError>,
        cause: UpgradeError,
    ) -> UpgradeError {
        match report {
            Ok(_) => {
                self.enter(UpgradePhase::Reverted);
                cause
            }
            Err(rollback) => {
                tracing::error!(%rollback, "rollback failed");
                UpgradeError::Rollback {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        }
    }
}
