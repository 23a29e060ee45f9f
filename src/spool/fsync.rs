//! Directory fsync for spool durability.
//!
//! Creating, linking or removing a file changes the directory entry, and that
//! change is only durable once the directory itself is synced. Syncing the
//! file contents alone is not enough: an entry whose payload reached disk can
//! still vanish after a power loss if its name did not.

use std::io;
use std::path::Path;

/// Syncs a directory so entries created or removed in it survive a crash.
///
/// On non-Unix platforms directories cannot be opened for syncing and this
/// is a no-op.
#[cfg(unix)]
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    std::fs::File::open(dir_path)?.sync_all()
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir_path: &Path) -> io::Result<()> {
    Ok(())
}
