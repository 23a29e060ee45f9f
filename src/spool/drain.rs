//! Listing and releasing pending entries.
//!
//! Draining is read-only and can be repeated at any time: an entry stays
//! pending until [`Spool::release`] deletes it, so a dispatcher that crashes
//! mid-entry finds the same entry again on restart.

use std::io;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::entry::{SpoolEntry, TEMP_PREFIX};
use super::fsync::fsync_dir;
use super::{Result, Spool};

/// Pending entries in arrival order, as returned by [`Spool::drain`].
///
/// The directory is listed once when the drain starts; payloads are only read
/// when the caller asks for them.
#[derive(Debug)]
pub struct Drain {
    entries: std::vec::IntoIter<SpoolEntry>,
}

impl Iterator for Drain {
    type Item = SpoolEntry;

    fn next(&mut self) -> Option<SpoolEntry> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Drain {}

impl Spool {
    /// Lists pending entries, oldest first.
    ///
    /// Only regular files with well-formed entry names are returned. Temp
    /// files, directories, symlinks and foreign files are skipped. A missing
    /// spool directory is an empty spool.
    ///
    /// # Errors
    ///
    /// Returns an error if the spool directory cannot be read.
    pub fn drain(&self) -> Result<Drain> {
        let read_dir = match std::fs::read_dir(self.dir()) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Drain {
                    entries: Vec::new().into_iter(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut pending = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let file_name = dir_entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            match SpoolEntry::from_file_name(self.dir(), name) {
                Some(entry) => pending.push(entry),
                None => debug!(file = %name, "Ignoring foreign file in spool"),
            }
        }

        pending.sort_by(SpoolEntry::arrival_cmp);

        Ok(Drain {
            entries: pending.into_iter(),
        })
    }

    /// Returns the number of pending entries.
    pub fn count_pending(&self) -> Result<usize> {
        Ok(self.drain()?.len())
    }

    /// Deletes an entry. Deleting an entry that is already gone succeeds.
    pub fn release(&self, entry: &SpoolEntry) -> Result<()> {
        match std::fs::remove_file(&entry.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        fsync_dir(self.dir())?;
        Ok(())
    }

    /// Removes temp files older than `max_age`.
    ///
    /// Temp files are the staging names used by [`Spool::enqueue`]; one that
    /// outlives a write means the writer died before publishing it. Young temp
    /// files are left alone because a receiver may be writing them right now.
    pub fn cleanup_stale_temp(&self, max_age: Duration) -> Result<usize> {
        let read_dir = match std::fs::read_dir(self.dir()) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            let is_temp = dir_entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(TEMP_PREFIX));

            if is_temp
                && let Ok(metadata) = dir_entry.metadata()
                && metadata.is_file()
                && let Ok(modified) = metadata.modified()
                && modified < cutoff
            {
                match std::fs::remove_file(dir_entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(path = %dir_entry.path().display(), error = %e, "Failed to remove stale temp file")
                    }
                }
            }
        }

        if removed > 0 {
            fsync_dir(self.dir())?;
        }
        Ok(removed)
    }
}
