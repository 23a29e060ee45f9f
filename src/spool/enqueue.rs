//! Writing entries into the spool.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::{Event, HookName, Source};

use super::entry::{SUFFIX_LEN, SpoolEntry, TEMP_PREFIX, format_entry_name, random_suffix};
use super::fsync::fsync_dir;
use super::{Result, Spool, SpoolError};

/// How many names are tried before giving up with [`SpoolError::NameCollision`].
pub const MAX_NAME_ATTEMPTS: usize = 8;

impl Spool {
    /// Durably writes `payload` as a new entry for `hook` and returns it.
    ///
    /// The payload is written and fsynced under a temp name, then hard-linked
    /// to its final name. Linking fails if the target exists, so an existing
    /// entry is never overwritten; on collision a fresh suffix is tried. The
    /// dispatcher only ever sees complete files.
    ///
    /// # Errors
    ///
    /// - [`SpoolError::InvalidHook`] if `hook` is not a valid hook name
    /// - [`SpoolError::WriteFailed`] if the payload could not be persisted
    /// - [`SpoolError::NameCollision`] if every candidate name was taken
    pub fn enqueue(&self, hook: &str, source: &Source, payload: &[u8]) -> Result<SpoolEntry> {
        let hook = HookName::parse(hook)?;
        self.enqueue_with(&hook, source, payload, Utc::now(), &mut || {
            random_suffix(SUFFIX_LEN)
        })
    }

    /// Spools an accepted [`Event`], stamping the entry with its receive time.
    pub fn enqueue_event(&self, event: &Event) -> Result<SpoolEntry> {
        self.enqueue_with(
            &event.hook,
            &event.source,
            &event.payload,
            event.received_at,
            &mut || random_suffix(SUFFIX_LEN),
        )
    }

    /// Like [`Spool::enqueue`] with an explicit clock reading and suffix generator.
    pub(crate) fn enqueue_with(
        &self,
        hook: &HookName,
        source: &Source,
        payload: &[u8],
        now: DateTime<Utc>,
        next_suffix: &mut dyn FnMut() -> String,
    ) -> Result<SpoolEntry> {
        std::fs::create_dir_all(self.dir()).map_err(SpoolError::WriteFailed)?;

        let temp_path = write_temp(self.dir(), hook, payload).map_err(SpoolError::WriteFailed)?;
        let linked = link_unique(self.dir(), hook, now, next_suffix, &temp_path);

        // The temp name is only a staging handle; the linked name keeps the data.
        if let Err(e) = std::fs::remove_file(&temp_path) {
            warn!(path = %temp_path.display(), error = %e, "Failed to remove spool temp file");
        }

        let name = linked?;
        fsync_dir(self.dir()).map_err(SpoolError::WriteFailed)?;

        let entry = SpoolEntry::from_file_name(self.dir(), &name)
            .ok_or_else(|| SpoolError::WriteFailed(io::Error::other("generated malformed name")))?;
        debug!(entry = %entry.id, hook = %hook, source = %source, bytes = payload.len(), "Spooled entry");
        Ok(entry)
    }

    /// Publishes and removes a throwaway file to confirm the directory can
    /// hold entries at all.
    ///
    /// Publishing relies on hard links, which some filesystems (FAT, several
    /// network mounts) do not support. Both names carry the temp prefix, so a
    /// crash midway leaves nothing the dispatcher would drain.
    ///
    /// # Errors
    ///
    /// [`SpoolError::WriteFailed`] if the directory cannot be created or
    /// written, or does not support hard links.
    pub fn check_publishable(&self) -> Result<()> {
        std::fs::create_dir_all(self.dir()).map_err(SpoolError::WriteFailed)?;

        let check_hook = HookName::parse("publish-check")?;
        let temp_path = write_temp(self.dir(), &check_hook, b"").map_err(SpoolError::WriteFailed)?;
        let link_path = self.dir().join(format!(
            "{}link-{}",
            TEMP_PREFIX,
            random_suffix(SUFFIX_LEN * 2)
        ));

        let linked = std::fs::hard_link(&temp_path, &link_path);
        let _ = std::fs::remove_file(&temp_path);
        linked.map_err(SpoolError::WriteFailed)?;
        std::fs::remove_file(&link_path).map_err(SpoolError::WriteFailed)?;
        Ok(())
    }
}

/// Writes the payload to a fresh, exclusively created temp file and syncs it.
fn write_temp(dir: &Path, hook: &HookName, payload: &[u8]) -> io::Result<PathBuf> {
    loop {
        let path = dir.join(format!(
            "{}{}-{}",
            TEMP_PREFIX,
            hook,
            random_suffix(SUFFIX_LEN * 2)
        ));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        let written = file.write_all(payload).and_then(|()| file.sync_all());
        if let Err(e) = written {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        return Ok(path);
    }
}

/// Links `temp_path` to the first free entry name and returns that name.
fn link_unique(
    dir: &Path,
    hook: &HookName,
    now: DateTime<Utc>,
    next_suffix: &mut dyn FnMut() -> String,
    temp_path: &Path,
) -> Result<String> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = format_entry_name(hook, now, &next_suffix());
        match std::fs::hard_link(temp_path, dir.join(&name)) {
            Ok(()) => return Ok(name),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(entry = %name, "Spool entry name already taken, retrying with a new suffix");
            }
            Err(e) => return Err(SpoolError::WriteFailed(e)),
        }
    }

    Err(SpoolError::NameCollision {
        hook: hook.clone(),
        attempts: MAX_NAME_ATTEMPTS,
    })
}
