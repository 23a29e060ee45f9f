//! Newtype wrappers for the identifiers that cross the receiver/dispatcher boundary.
//!
//! Both identifiers end up as filename components in the spool directory, so
//! they are validated on construction rather than trusted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest hook name accepted, in bytes.
pub const MAX_HOOK_NAME_LEN: usize = 100;

/// A hook name failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hook name {0:?}: expected 1-100 of [A-Za-z0-9._-], not starting with '.'")]
pub struct InvalidHookName(pub String);

/// The name of an inbound event category (e.g. `codenames`, `apps-wiki`).
///
/// Hook names select both the shared secret used for verification and the
/// action the dispatcher runs. A valid name is non-empty, at most
/// [`MAX_HOOK_NAME_LEN`] bytes, uses only ASCII alphanumerics, `-`, `_` and
/// `.`, and does not start with `.` (dot-files in the spool are in-flight
/// writes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HookName(String);

impl HookName {
    /// Validates and wraps a hook name.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidHookName> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.len() <= MAX_HOOK_NAME_LEN
            && !s.starts_with('.')
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if valid {
            Ok(HookName(s))
        } else {
            Err(InvalidHookName(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for HookName {
    type Error = InvalidHookName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        HookName::parse(s)
    }
}

impl From<HookName> for String {
    fn from(h: HookName) -> Self {
        h.0
    }
}

/// The identity of a spool entry: its filename within the spool directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(s: impl Into<String>) -> Self {
        EntryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
