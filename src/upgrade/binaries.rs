// ABOUTME: Shared bin directory symlink management.
// ABOUTME: Links one major version's executables and checks where links point.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;

use super::context::DirectoryPaths;
use crate::process::ExecutionError;

/// Binary whose link identifies the installed version.
pub const SENTINEL_BINARY: &str = "pg_ctl";

/// Symlink every executable of `major` into the shared bin directory.
///
/// Existing links are replaced atomically (link to a temp name, then
/// rename over the old one), so re-running is harmless.
pub fn link_version(paths: &DirectoryPaths, major: u32) -> Result<usize, ExecutionError> {
    let action = format!("link PostgreSQL {major} binaries");
    let source_dir = paths.version_bin_dir(major);

    let entries =
        fs::read_dir(&source_dir).map_err(|e| ExecutionError::io(&action, &source_dir, e))?;

    let mut linked = 0;
    for entry in entries {
        let entry = entry.map_err(|e| ExecutionError::io(&action, &source_dir, e))?;
        let name = entry.file_name();
        let target = entry.path();
        let link = paths.bin_dir.join(&name);

        let mut staging = link.clone().into_os_string();
        staging.push(".pg-upgrader-link");
        let staging = std::path::PathBuf::from(staging);

        let _ = fs::remove_file(&staging);
        symlink(&target, &staging).map_err(|e| ExecutionError::io(&action, &staging, e))?;
        fs::rename(&staging, &link).map_err(|e| ExecutionError::io(&action, &link, e))?;
        linked += 1;
    }

    tracing::info!(major, linked, bin_dir = %paths.bin_dir.display(), "linked binaries");
    Ok(linked)
}

/// Check that every executable of `major` is linked from the bin directory.
pub fn verify_links(paths: &DirectoryPaths, major: u32) -> Result<(), ExecutionError> {
    let action = format!("verify PostgreSQL {major} binary links");
    let source_dir = paths.version_bin_dir(major);

    let entries =
        fs::read_dir(&source_dir).map_err(|e| ExecutionError::io(&action, &source_dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| ExecutionError::io(&action, &source_dir, e))?;
        let link = paths.bin_dir.join(entry.file_name());
        let points_to = fs::read_link(&link).map_err(|e| ExecutionError::io(&action, &link, e))?;
        if points_to != entry.path() {
            return Err(ExecutionError::failed(
                action,
                format!(
                    "{} points to {} instead of {}",
                    link.display(),
                    points_to.display(),
                    entry.path().display()
                ),
            ));
        }
    }

    Ok(())
}

/// Major version the sentinel binary currently links to, if it is a link
/// into the install root.
pub fn linked_major(paths: &DirectoryPaths) -> Option<u32> {
    let target = fs::read_link(paths.bin_dir.join(SENTINEL_BINARY)).ok()?;
    let version_dir = target.parent()?.parent()?;
    if version_dir.parent()? != paths.install_root.as_path() {
        return None;
    }
    version_dir.file_name()?.to_str()?.parse().ok()
}

/// Refuse installs whose binaries are not links into the versioned install
/// root for `major`.
pub fn check_standard_install(paths: &DirectoryPaths, major: u32) -> Result<(), String> {
    let link = paths.bin_dir.join(SENTINEL_BINARY);
    let target = match fs::read_link(&link) {
        Ok(target) => target,
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            return Err(format!("{} is not a symlink", link.display()));
        }
        Err(e) => return Err(format!("cannot read {}: {e}", link.display())),
    };

    let expected = paths.version_bin_dir(major).join(SENTINEL_BINARY);
    if target != expected {
        return Err(format!(
            "{} points to {}, expected {}",
            link.display(),
            target.display(),
            expected.display()
        ));
    }

    Ok(())
}

/// True if `path` exists, without following a final symlink.
pub(crate) fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layout(root: &Path) -> DirectoryPaths {
        let paths = DirectoryPaths {
            data_dir: root.join("data"),
            temp_dir_prefix: root.join("data"),
            install_root: root.join("install"),
            bin_dir: root.join("bin"),
        };
        for major in [11, 12] {
            let dir = paths.version_bin_dir(major);
            fs::create_dir_all(&dir).unwrap();
            for tool in ["pg_ctl", "initdb", "postgres"] {
                fs::write(dir.join(tool), "#!/bin/sh\n").unwrap();
            }
        }
        fs::create_dir_all(&paths.bin_dir).unwrap();
        paths
    }

    #[test]
    fn link_version_is_idempotent_and_switchable() {
        let root = tempfile::tempdir().unwrap();
        let paths = layout(root.path());

        assert_eq!(link_version(&paths, 11).unwrap(), 3);
        assert_eq!(linked_major(&paths), Some(11));
        assert!(check_standard_install(&paths, 11).is_ok());

        link_version(&paths, 12).unwrap();
        link_version(&paths, 12).unwrap();
        assert_eq!(linked_major(&paths), Some(12));
        verify_links(&paths, 12).unwrap();
        assert!(verify_links(&paths, 11).is_err());
    }

    #[test]
    fn plain_file_is_not_a_standard_install() {
        let root = tempfile::tempdir().unwrap();
        let paths = layout(root.path());
        fs::write(paths.bin_dir.join(SENTINEL_BINARY), "binary").unwrap();

        let err = check_standard_install(&paths, 11).unwrap_err();
        assert!(err.contains("not a symlink"));
        assert_eq!(linked_major(&paths), None);
    }

    #[test]
    fn foreign_link_is_not_a_standard_install() {
        let root = tempfile::tempdir().unwrap();
        let paths = layout(root.path());
        symlink(
            PathBuf::from("/usr/lib/postgresql/11/bin/pg_ctl"),
            paths.bin_dir.join(SENTINEL_BINARY),
        )
        .unwrap();

        assert!(check_standard_install(&paths, 11).is_err());
        assert_eq!(linked_major(&paths), None);
    }
}
