// ABOUTME: Error taxonomy for upgrade and revert runs.
// ABOUTME: Preconditions never roll back; fatal migration errors always do.

use std::path::PathBuf;

use super::lock::LockError;
use crate::maintenance::MaintenanceError;
use crate::process::{CommandOutput, ExecutionError};
use crate::services::{ClusterError, ServiceError};
use crate::types::Version;
use crate::versions::VersionError;

/// A check that failed before anything was changed.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("no PostgreSQL data directory at {0}; nothing to upgrade on this node")]
    NoDatabase(PathBuf),

    #[error("{0} is not running; start it before upgrading")]
    DatabaseNotRunning(String),

    #[error("cannot determine whether the database is running: {0}")]
    DatabaseStatus(#[source] ServiceError),

    #[error("no newer PostgreSQL version is installed; nothing to upgrade to")]
    NoUpgradeTarget,

    #[error("already running PostgreSQL {0}; nothing to do")]
    AlreadyOnTarget(Version),

    #[error("refusing to move from PostgreSQL {running} to older version {target}")]
    Downgrade { running: Version, target: Version },

    #[error("PostgreSQL {major} is not installed at {path}")]
    TargetNotInstalled { major: u32, path: PathBuf },

    #[error("HA node already linked to PostgreSQL {0}; nothing to do")]
    HaNodeOnTarget(u32),

    #[error(
        "non-standard installation, refusing to upgrade: {0}. \
         The upgrader only manages binaries linked from the bundled install root."
    )]
    NonStandardInstall(String),

    #[error(
        "{0} already exists; move or remove it before upgrading so a rollback \
         cannot restore the wrong cluster"
    )]
    StalePreservedDirectory(PathBuf),

    #[error(
        "not enough free space in {path}: {required_kb} KiB needed, {available_kb} KiB available \
         (pass --skip-disk-check to override)"
    )]
    InsufficientDiskSpace {
        path: PathBuf,
        required_kb: u64,
        available_kb: u64,
    },

    #[error("disk space check failed: {0}")]
    DiskCheck(#[source] ExecutionError),

    #[error("cannot resolve PostgreSQL versions: {0}")]
    Versions(#[from] VersionError),

    #[error("data directory already at PostgreSQL {0}; nothing to revert")]
    NothingToRevert(u32),
}

impl PreconditionError {
    /// Whether the run should exit successfully without doing anything.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(
            self,
            PreconditionError::NoDatabase(_)
                | PreconditionError::NoUpgradeTarget
                | PreconditionError::AlreadyOnTarget(_)
                | PreconditionError::HaNodeOnTarget(_)
                | PreconditionError::NothingToRevert(_)
        )
    }
}

/// One rollback step that could not be completed.
#[derive(Debug, Clone)]
pub struct RollbackFailure {
    pub step: String,
    pub error: String,
    /// What the failed command printed, if the step ran one.
    pub output: Option<CommandOutput>,
    /// What the operator has to run by hand instead.
    pub manual_step: String,
}

impl RollbackFailure {
    pub fn new(
        step: impl Into<String>,
        error: impl Into<String>,
        manual_step: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
            output: None,
            manual_step: manual_step.into(),
        }
    }

    /// A failed step that ran a command; keeps the command's output.
    pub fn execution(
        step: impl Into<String>,
        error: &ExecutionError,
        manual_step: impl Into<String>,
    ) -> Self {
        Self {
            output: error.output().cloned(),
            ..Self::new(step, error.to_string(), manual_step)
        }
    }
}

/// Rollback itself failed; no further automatic recovery is attempted.
#[derive(Debug, thiserror::Error)]
#[error("rollback incomplete; manual recovery required:\n{}", format_failures(.failures))]
pub struct RollbackError {
    pub failures: Vec<RollbackFailure>,
}

fn format_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let mut text = format!("  {}. {} failed: {}", i + 1, f.step, f.error);
            if let Some(output) = &f.output {
                for line in output.stdout.lines().chain(output.stderr.lines()) {
                    text.push_str("\n     | ");
                    text.push_str(line);
                }
            }
            text.push_str("\n     run: ");
            text.push_str(&f.manual_step);
            text
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("{0}")]
    Execution(#[source] ExecutionError),

    #[error("fatal migration error: {0}")]
    FatalMigration(#[source] ExecutionError),

    #[error("{rollback}\nrollback was triggered by: {cause}")]
    Rollback {
        cause: Box<UpgradeError>,
        rollback: RollbackError,
    },

    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("interrupted by operator")]
    Interrupted,

    #[error(
        "binaries reverted to PostgreSQL {major} but data could not be reverted: \
         preserved directory {path} is missing"
    )]
    DataNotReverted { major: u32, path: PathBuf },
}

impl UpgradeError {
    /// Process exit code: 0 for nothing-to-do, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            UpgradeError::Precondition(e) if e.is_nothing_to_do() => 0,
            _ => 1,
        }
    }

    /// Captured output of the external command behind this failure.
    pub fn command_output(&self) -> Option<&CommandOutput> {
        match self {
            UpgradeError::Execution(e) | UpgradeError::FatalMigration(e) => e.output(),
            UpgradeError::Rollback { cause, .. } => cause.command_output(),
            UpgradeError::Cluster(e) => e.execution().and_then(ExecutionError::output),
            UpgradeError::Maintenance(MaintenanceError::DeployPage(e)) => e.output(),
            UpgradeError::Maintenance(MaintenanceError::Service(e)) => e.execution().output(),
            UpgradeError::Precondition(PreconditionError::DiskCheck(e)) => e.output(),
            UpgradeError::Precondition(PreconditionError::DatabaseStatus(e)) => {
                e.execution().output()
            }
            _ => None,
        }
    }
}

impl From<ServiceError> for ExecutionError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Start { source, .. }
            | ServiceError::Stop { source, .. }
            | ServiceError::Status { source, .. } => source,
        }
    }
}
