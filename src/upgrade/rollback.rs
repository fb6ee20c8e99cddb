// ABOUTME: Automatic rollback to the previous major version after a failed upgrade.
// ABOUTME: Driven by what is on disk, so it is safe from any migration state.

use std::fs;
use std::path::Path;

use super::binaries::{self, exists};
use super::context::UpgradeContext;
use super::error::{RollbackError, RollbackFailure};
use super::host::Host;
use super::migration::Migration;
use super::probe::wait_until_ready;
use super::relocate::move_dir;

/// What a completed rollback managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackReport {
    /// The preserved data directory was moved back into place.
    pub restored_data: bool,
}

impl<S> Migration<S> {
    /// Undo this migration, wherever it stopped.
    pub async fn rollback(self, host: &Host) -> Result<RollbackReport, RollbackError> {
        rollback(&self.ctx, host).await
    }
}

/// Stop the database, put the old data directory and binaries back, and
/// start it on the running version again.
///
/// Every step is attempted even if an earlier one failed; all failures are
/// returned together with what to run by hand.
pub async fn rollback(ctx: &UpgradeContext, host: &Host) -> Result<RollbackReport, RollbackError> {
    let mut failures = Vec::new();
    let service = &ctx.database.service;
    let running = ctx.running_version.major;

    tracing::warn!(major = running, "rolling back to previous version");

    if let Err(e) = host.services.stop(service).await {
        failures.push(RollbackFailure::execution(
            "stop database",
            e.execution(),
            format!("stop the {service} service"),
        ));
    }

    let restored_data = restore_data_dir(ctx, &mut failures);

    if let Err(e) = binaries::link_version(&ctx.paths, running) {
        failures.push(RollbackFailure::execution(
            "relink previous binaries",
            &e,
            format!(
                "ln -sf {}/* {}/",
                ctx.paths.version_bin_dir(running).display(),
                ctx.paths.bin_dir.display()
            ),
        ));
    }

    match host.services.start(service).await {
        Ok(()) => {
            let ready = wait_until_ready(
                host.runner.as_ref(),
                &ctx.paths,
                running,
                &ctx.database,
                &ctx.timeouts,
            )
            .await;
            if let Err(e) = ready {
                failures.push(RollbackFailure::execution(
                    "wait for database",
                    &e,
                    format!("check the {service} logs and start it again"),
                ));
            }
        }
        Err(e) => failures.push(RollbackFailure::execution(
            "start database",
            e.execution(),
            format!("start the {service} service"),
        )),
    }

    if failures.is_empty() {
        tracing::info!(major = running, restored_data, "rollback complete");
        Ok(RollbackReport { restored_data })
    } else {
        Err(RollbackError { failures })
    }
}

/// Returns whether the preserved directory was moved back.
fn restore_data_dir(ctx: &UpgradeContext, failures: &mut Vec<RollbackFailure>) -> bool {
    let data_dir = &ctx.paths.data_dir;
    let preserved = ctx.preserved_data_dir();
    let scratch = ctx.new_data_dir();
    let mut restored = false;

    if exists(&preserved) {
        match put_back(&preserved, data_dir) {
            Ok(()) => {
                tracing::info!(path = %data_dir.display(), "restored previous data directory");
                restored = true;
            }
            Err(e) => failures.push(RollbackFailure::new(
                "restore data directory",
                e.to_string(),
                format!(
                    "rm -rf {data} && mv {preserved} {data}",
                    data = data_dir.display(),
                    preserved = preserved.display()
                ),
            )),
        }
    } else if !exists(data_dir) {
        failures.push(RollbackFailure::new(
            "restore data directory",
            format!(
                "neither {} nor {} exists",
                data_dir.display(),
                preserved.display()
            ),
            "restore the data directory from backup",
        ));
    }

    if exists(&scratch)
        && let Err(e) = fs::remove_dir_all(&scratch)
    {
        failures.push(RollbackFailure::new(
            "remove scratch directory",
            e.to_string(),
            format!("rm -rf {}", scratch.display()),
        ));
    }

    restored
}

fn put_back(preserved: &Path, data_dir: &Path) -> std::io::Result<()> {
    if exists(data_dir) {
        fs::remove_dir_all(data_dir)?;
    }
    move_dir(preserved, data_dir)
}
