// ABOUTME: Read-only checks run before an upgrade changes anything.
// ABOUTME: Nothing-to-do outcomes come first so a no-op run never touches the node.

use std::path::{Path, PathBuf};

use super::binaries::{self, exists};
use super::context::{DirectoryPaths, UpgradeOptions};
use super::error::PreconditionError;
use super::host::Host;
use crate::config::Config;
use crate::process::{CommandSpec, ExecutionError, ProcessRunner};
use crate::services::ServiceStatus;
use crate::types::Version;
use crate::versions::VersionResolver;

/// Versions an upgrade run moves between.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVersions {
    pub running: Version,
    pub target: Version,
}

/// Check that an upgrade can and should run.
///
/// Order matters: the nothing-to-do checks (no database, no target, already
/// upgraded) precede everything that could fail on a healthy node.
pub async fn check_preconditions(
    config: &Config,
    paths: &DirectoryPaths,
    options: &UpgradeOptions,
    host: &Host,
    ha_enabled: bool,
) -> Result<ResolvedVersions, PreconditionError> {
    if !paths.data_dir.is_dir() {
        return Err(PreconditionError::NoDatabase(paths.data_dir.clone()));
    }

    let resolver = VersionResolver::new(&config.paths.manifest, &paths.data_dir);
    let running = resolver.current_version()?;
    let target = match options.target_version {
        Some(major) => Version::from_major(major),
        None => resolver
            .upgrade_version()?
            .ok_or(PreconditionError::NoUpgradeTarget)?,
    };

    if running.same_major(&target) {
        return Err(PreconditionError::AlreadyOnTarget(running));
    }
    if target.major < running.major {
        return Err(PreconditionError::Downgrade { running, target });
    }
    if ha_enabled && binaries::linked_major(paths) == Some(target.major) {
        return Err(PreconditionError::HaNodeOnTarget(target.major));
    }

    let target_bin = paths.version_bin_dir(target.major);
    if !target_bin.is_dir() {
        return Err(PreconditionError::TargetNotInstalled {
            major: target.major,
            path: target_bin,
        });
    }

    binaries::check_standard_install(paths, running.major)
        .map_err(PreconditionError::NonStandardInstall)?;

    let service = &config.database.service;
    match host.services.status(service).await {
        Ok(ServiceStatus::Up) => {}
        Ok(ServiceStatus::Down) => {
            return Err(PreconditionError::DatabaseNotRunning(service.to_string()));
        }
        Err(e) => return Err(PreconditionError::DatabaseStatus(e)),
    }

    let preserved = paths.temp_data_dir(running.major);
    if exists(&preserved) {
        return Err(PreconditionError::StalePreservedDirectory(preserved));
    }

    if options.skip_disk_check {
        tracing::info!("skipping disk space check");
    } else {
        check_disk_space(host.runner.as_ref(), paths).await?;
    }

    tracing::info!(%running, %target, "preconditions passed");
    Ok(ResolvedVersions { running, target })
}

/// The scratch location must have room for a full copy of the data directory.
async fn check_disk_space(
    runner: &dyn ProcessRunner,
    paths: &DirectoryPaths,
) -> Result<(), PreconditionError> {
    let du = CommandSpec::new("du")
        .arg("-sk")
        .arg(paths.data_dir.display().to_string());
    let output = runner
        .run_checked("measure data directory", &du)
        .await
        .map_err(PreconditionError::DiskCheck)?;
    let required_kb = parse_du(&output.stdout).ok_or_else(|| {
        PreconditionError::DiskCheck(ExecutionError::failed(
            "measure data directory",
            format!("unexpected du output: {}", output.stdout.trim()),
        ))
    })?;

    let location = existing_ancestor(paths.temp_parent());
    let df = CommandSpec::new("df")
        .arg("-Pk")
        .arg(location.display().to_string());
    let output = runner
        .run_checked("measure free space", &df)
        .await
        .map_err(PreconditionError::DiskCheck)?;
    let available_kb = parse_df(&output.stdout).ok_or_else(|| {
        PreconditionError::DiskCheck(ExecutionError::failed(
            "measure free space",
            format!("unexpected df output: {}", output.stdout.trim()),
        ))
    })?;

    tracing::debug!(required_kb, available_kb, path = %location.display(), "disk space");
    if available_kb < required_kb {
        return Err(PreconditionError::InsufficientDiskSpace {
            path: location,
            required_kb,
            available_kb,
        });
    }

    Ok(())
}

/// `--tmp-dir` may name a directory that is created later.
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.is_dir())
        .unwrap_or(Path::new("/"))
        .to_path_buf()
}

/// Size in KiB from `du -sk` output (`<size>\t<path>`).
fn parse_du(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

/// Available KiB from POSIX `df -Pk` output (fourth column of the data line).
fn parse_df(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())?
        .split_whitespace()
        .nth(3)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_du_output() {
        assert_eq!(parse_du("204800\t/var/opt/db/data\n"), Some(204800));
        assert_eq!(parse_du(""), None);
    }

    #[test]
    fn parses_df_output() {
        let out = "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
                   /dev/sda1        41152736 12345678  28807058      31% /\n";
        assert_eq!(parse_df(out), Some(28807058));
    }

    #[test]
    fn df_without_data_line_is_none() {
        assert_eq!(parse_df("Filesystem 1024-blocks Used Available\n"), None);
    }

    #[test]
    fn existing_ancestor_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a").join("b");
        assert_eq!(existing_ancestor(&missing), dir.path());
    }
}
