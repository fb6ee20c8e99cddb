// ABOUTME: Moves a data directory, falling back to copy-and-delete across filesystems.
// ABOUTME: A failed copy leaves the source intact and removes the partial destination.

use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::{MetadataExt, lchown, symlink};
use std::path::Path;

/// `EXDEV` on Linux.
const CROSS_DEVICE: i32 = 18;

/// Move the directory `from` to `to`, which must not exist.
///
/// A plain rename when both are on the same filesystem. Otherwise the tree is
/// copied with its modes and ownership and the source is removed afterwards.
pub fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if crosses_devices(&e) => {
            tracing::info!(
                from = %from.display(),
                to = %to.display(),
                "target is on another filesystem, copying"
            );
            move_by_copy(from, to)
        }
        Err(e) => Err(e),
    }
}

fn crosses_devices(err: &io::Error) -> bool {
    err.kind() == ErrorKind::CrossesDevices || err.raw_os_error() == Some(CROSS_DEVICE)
}

fn move_by_copy(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a directory", from.display()),
        ));
    }

    // Created outside the cleanup below so an existing destination is never removed.
    fs::create_dir(to)?;

    if let Err(e) = copy_contents(from, to).and_then(|()| copy_attributes(&meta, to)) {
        if let Err(cleanup) = fs::remove_dir_all(to) {
            tracing::error!(
                path = %to.display(),
                error = %cleanup,
                "could not remove partial copy"
            );
        }
        return Err(e);
    }

    fs::remove_dir_all(from)
}

fn copy_contents(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        let meta = fs::symlink_metadata(&source)?;
        let kind = meta.file_type();

        if kind.is_dir() {
            fs::create_dir(&dest)?;
            copy_contents(&source, &dest)?;
            copy_attributes(&meta, &dest)?;
        } else if kind.is_symlink() {
            symlink(fs::read_link(&source)?, &dest)?;
            copy_owner(&meta, &dest)?;
        } else if kind.is_file() {
            fs::copy(&source, &dest)?;
            copy_owner(&meta, &dest)?;
        } else {
            return Err(io::Error::new(
                ErrorKind::Unsupported,
                format!("cannot copy special file {}", source.display()),
            ));
        }
    }
    Ok(())
}

fn copy_attributes(meta: &fs::Metadata, dest: &Path) -> io::Result<()> {
    copy_owner(meta, dest)?;
    fs::set_permissions(dest, meta.permissions())
}

fn copy_owner(meta: &fs::Metadata, dest: &Path) -> io::Result<()> {
    let current = fs::symlink_metadata(dest)?;
    if current.uid() == meta.uid() && current.gid() == meta.gid() {
        return Ok(());
    }
    lchown(dest, Some(meta.uid()), Some(meta.gid()))
}
