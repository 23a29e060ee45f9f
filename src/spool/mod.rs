//! Filesystem spool between the receiver and the dispatcher.
//!
//! The spool is a single directory. Each accepted webhook becomes one file:
//!
//! ```text
//! <hook>-<YYYYMMDD_HHMMSS>-<7 random alphanumerics>   - pending (raw payload)
//! .tmp-<hook>-<random>                                - write in progress
//! ```
//!
//! # Crash Safety
//!
//! - Payloads are written to a temp file, fsynced, then hard-linked into place
//!   (the link fails rather than overwrite), then the directory is fsynced
//! - An entry exists until the dispatcher releases it; a crash at any point
//!   leaves it pending, so delivery is at-least-once
//! - Temp files left by a crashed writer are never drained and are swept at
//!   dispatcher startup

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{HookName, InvalidHookName};

pub mod drain;
pub mod enqueue;
pub mod entry;
pub mod fsync;

pub use drain::Drain;
pub use enqueue::MAX_NAME_ATTEMPTS;
pub use entry::{EntryName, SpoolEntry, format_entry_name, parse_entry_name};

/// Errors that can occur during spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The payload could not be durably written.
    #[error("failed to write spool entry: {0}")]
    WriteFailed(#[source] io::Error),

    /// Every candidate entry name was already taken.
    #[error("no free spool entry name for hook {hook} after {attempts} attempts")]
    NameCollision { hook: HookName, attempts: usize },

    /// The hook name cannot be used as a filename component.
    #[error(transparent)]
    InvalidHook(#[from] InvalidHookName),

    /// IO error while listing, reading or releasing entries.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

/// A handle on a spool directory.
///
/// The handle holds no state besides the path; any number of handles, in any
/// number of processes, may point at the same directory.
#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Spool { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
