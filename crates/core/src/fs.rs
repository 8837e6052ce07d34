//! Atomic file replacement.
//!
//! Content is staged in a temporary file next to the target and renamed over
//! it. Readers see either the previous file or the complete new one. If
//! anything fails before the rename the temporary file is removed and the
//! target is untouched.

use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Permission bits given to files that did not exist before.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Read a file, returning `None` if it does not exist.
///
/// # Errors
///
/// Returns an I/O error for anything other than "not found".
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(e, path, "read")),
    }
}

/// Atomically replace (or create) `path` with `bytes`.
///
/// The parent directory must exist. An existing target keeps its permission
/// bits; a new target gets `0o644` on Unix.
///
/// # Errors
///
/// Returns an I/O error if staging, syncing or renaming fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let previous_permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut tmp = tempfile::Builder::new()
        .prefix(".stencil-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(e, parent, "create_temp"))?;

    tmp.write_all(bytes)
        .map_err(|e| Error::io(e, tmp.path(), "write"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(e, tmp.path(), "sync"))?;

    match previous_permissions {
        Some(perms) => fs::set_permissions(tmp.path(), perms)
            .map_err(|e| Error::io(e, tmp.path(), "set_permissions"))?,
        None => set_new_file_mode(tmp.path())?,
    }

    // Dropping a NamedTempFile removes it, so a failed persist leaves no debris.
    tmp.persist(path)
        .map_err(|e| Error::io(e.error, path, "rename"))?;

    sync_dir_best_effort(parent);
    tracing::trace!(path = %path.display(), bytes = bytes.len(), "Atomic write complete");
    Ok(())
}

/// Set Unix permission bits on `path`. No-op elsewhere.
///
/// # Errors
///
/// Returns an I/O error if the permissions cannot be changed.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::io(e, path, "chmod"))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Unix permission bits of `path`, if available.
#[must_use]
pub fn mode_of(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

fn set_new_file_mode(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        set_mode(path, NEW_FILE_MODE)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    if let Err(err) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %err, "Failed to sync directory (best effort)");
    }
    #[cfg(not(unix))]
    let _ = dir;
}
