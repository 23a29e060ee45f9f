//! Spool entry naming.
//!
//! Every entry is a regular file named `{hook}-{YYYYMMDD_HHMMSS}-{suffix}`,
//! where `suffix` is 7 random ASCII alphanumerics. The name is the only
//! protocol between the receiver and the dispatcher: it carries the hook, it
//! orders entries chronologically, and it makes every entry unique.
//!
//! In-flight writes use names starting with [`TEMP_PREFIX`]. A leading dot
//! can never start a valid hook name, so temp files are never mistaken for
//! entries.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::types::{EntryId, HookName};

use super::Result;

/// `chrono` format of the timestamp component.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 7;

/// Prefix of temp files holding writes that are not yet visible.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Returns `len` random ASCII alphanumerics.
pub fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Formats an entry filename.
pub fn format_entry_name(hook: &HookName, at: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}", hook, at.format(TIMESTAMP_FORMAT), suffix)
}

/// The components of a well-formed entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    pub hook: HookName,
    pub timestamp: NaiveDateTime,
    pub suffix: String,
}

/// Splits an entry filename into its components.
///
/// Hook names may themselves contain `-`, so the name is split from the
/// right. Returns `None` for anything that is not a well-formed entry name,
/// including temp files.
pub fn parse_entry_name(name: &str) -> Option<EntryName> {
    let mut parts = name.rsplitn(3, '-');
    let suffix = parts.next()?;
    let timestamp = parts.next()?;
    let hook = parts.next()?;

    if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    let hook = HookName::parse(hook).ok()?;

    Some(EntryName {
        hook,
        timestamp,
        suffix: suffix.to_string(),
    })
}

/// A pending event in the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEntry {
    /// The filename, which is the entry's identity.
    pub id: EntryId,

    /// The hook the event was posted to.
    pub hook: HookName,

    /// When the receiver spooled the event, at one-second resolution.
    pub timestamp: NaiveDateTime,

    /// Full path to the entry file.
    pub path: PathBuf,

    suffix: String,
}

impl SpoolEntry {
    /// Builds an entry from a filename in `spool_dir`, if the name is well-formed.
    pub fn from_file_name(spool_dir: &Path, file_name: &str) -> Option<Self> {
        let parsed = parse_entry_name(file_name)?;
        Some(SpoolEntry {
            id: EntryId::new(file_name),
            hook: parsed.hook,
            timestamp: parsed.timestamp,
            path: spool_dir.join(file_name),
            suffix: parsed.suffix,
        })
    }

    /// Reads the raw payload bytes.
    pub fn read_payload(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    /// Arrival order: timestamp, then suffix, then the full name as a tiebreak.
    pub fn arrival_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.suffix.cmp(&other.suffix))
            .then_with(|| self.id.as_str().cmp(other.id.as_str()))
    }
}
