// ABOUTME: Run lock preventing concurrent upgrade or revert runs on one node.
// ABOUTME: Uses atomic file creation with holder info stored as JSON in the state dir.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostics, Warning};

const LOCK_FILENAME: &str = "pg-upgrade.lock";

/// Locks older than this are assumed to belong to a dead run.
const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another {operation} run holds the lock: {holder} (pid {pid}) since {started_at}")]
    Held {
        operation: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to serialize lock: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Information about who holds the run lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// `pg-upgrade` or `revert-pg-upgrade`.
    pub operation: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(operation: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            operation: operation.to_string(),
        }
    }

    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= STALE_AFTER_HOURS
    }

    pub fn lock_path(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILENAME)
    }
}

/// A held run lock that releases on drop.
#[derive(Debug)]
pub struct UpgradeLock {
    path: PathBuf,
}

impl UpgradeLock {
    /// Acquire the run lock.
    ///
    /// Stale or corrupted locks are broken with a warning.
    pub fn acquire(
        state_dir: &Path,
        operation: &str,
        diag: &mut Diagnostics,
    ) -> Result<Self, LockError> {
        fs::create_dir_all(state_dir).map_err(|source| LockError::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let path = LockInfo::lock_path(state_dir);
        let json = serde_json::to_string(&LockInfo::new(operation))?;

        if Self::try_create(&path, &json)? {
            return Ok(Self { path });
        }

        match fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<LockInfo>(&s).ok())
        {
            Some(existing) if !existing.is_stale() => {
                return Err(LockError::Held {
                    operation: existing.operation,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => diag.warn(Warning::stale_lock(format!(
                "breaking stale lock held by {} (pid {}) since {}",
                existing.holder, existing.pid, existing.started_at
            ))),
            None => diag.warn(Warning::stale_lock(format!(
                "breaking unreadable lock file {}",
                path.display()
            ))),
        }

        let _ = fs::remove_file(&path);
        if Self::try_create(&path, &json)? {
            Ok(Self { path })
        } else {
            Err(LockError::Io {
                path,
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "lock acquired by another process while breaking it",
                ),
            })
        }
    }

    /// Create the lock file if absent. `Ok(false)` means it already exists.
    fn try_create(path: &Path, json: &str) -> Result<bool, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(json.as_bytes())
                    .map_err(|source| LockError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for UpgradeLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new("pg-upgrade");

        assert_eq!(info.operation, "pg-upgrade");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        assert!(!LockInfo::new("pg-upgrade").is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new("pg-upgrade");
        info.started_at = Utc::now() - chrono::Duration::hours(25);
        assert!(info.is_stale());
    }
}
