// ABOUTME: Major-version upgrade orchestration: preconditions, migration, rollback, revert.
// ABOUTME: The data directory migration is a type-state machine driven by the orchestrator.

pub mod binaries;
mod context;
mod error;
mod host;
mod locale;
mod lock;
mod migration;
mod orchestrator;
mod preconditions;
mod probe;
mod relocate;
mod revert;
mod rollback;
mod state;
mod transitions;

pub use context::{DirectoryPaths, RevertOptions, UpgradeContext, UpgradeOptions};
pub use error::{PreconditionError, RollbackError, RollbackFailure, UpgradeError};
pub use host::Host;
pub use locale::ClusterLocale;
pub use lock::{LockError, LockInfo, UpgradeLock};
pub use migration::Migration;
pub use orchestrator::{Orchestrator, UpgradeOutcome};
pub use preconditions::{ResolvedVersions, check_preconditions};
pub use probe::wait_until_ready;
pub use revert::RevertOutcome;
pub use rollback::{RollbackReport, rollback};
pub use state::{
    Completed, Initialized, Linked, Migrated, Pending, Running, Staged, Stopped, Swapped,
    UpgradePhase,
};
pub use transitions::TransitionResult;
