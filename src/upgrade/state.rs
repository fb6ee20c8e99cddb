// ABOUTME: Migration state markers for the type state pattern, plus run phases.
// ABOUTME: Zero-sized markers make out-of-order data directory steps unrepresentable.

use std::fmt;

/// Nothing touched yet; the database is still running.
/// Available actions: `capture_locale()`, `stop_database()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Database stopped.
/// Available actions: `link_binaries()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopped;

/// Target binaries linked into the shared bin directory.
/// Available actions: `create_temp_dir()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Linked;

/// Scratch directory for the new cluster exists.
/// Available actions: `initialize_cluster()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Staged;

/// New cluster initialized in the scratch directory.
/// Available actions: `migrate_data()`, `skip_migration()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Scratch cluster ready to become the live one.
/// Available actions: `swap_directories()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Migrated;

/// Point of no return passed: the new cluster is the live data directory.
/// Available actions: `start()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Swapped;

/// New cluster running and configuration regenerated.
/// Available actions: `analyze()`, `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Running;

/// Upgrade finished.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Completed;

/// Coarse orchestrator state, used for logging and to decide whether a
/// failure needs a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    Idle,
    PreconditionsChecked,
    MaintenanceEnabled,
    SecondaryPrepared,
    PreUpgrade,
    Migrated,
    PostUpgrade,
    MaintenanceDisabled,
    Done,
    RollingBack,
    Reverted,
}

impl UpgradePhase {
    /// Whether the database has been stopped or its files changed.
    pub fn touched_database(&self) -> bool {
        matches!(
            self,
            UpgradePhase::PreUpgrade | UpgradePhase::Migrated | UpgradePhase::PostUpgrade
        )
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradePhase::Idle => "idle",
            UpgradePhase::PreconditionsChecked => "preconditions-checked",
            UpgradePhase::MaintenanceEnabled => "maintenance-enabled",
            UpgradePhase::SecondaryPrepared => "secondary-prepared",
            UpgradePhase::PreUpgrade => "pre-upgrade",
            UpgradePhase::Migrated => "migrated",
            UpgradePhase::PostUpgrade => "post-upgrade",
            UpgradePhase::MaintenanceDisabled => "maintenance-disabled",
            UpgradePhase::Done => "done",
            UpgradePhase::RollingBack => "rolling-back",
            UpgradePhase::Reverted => "reverted",
        };
        f.write_str(name)
    }
}
