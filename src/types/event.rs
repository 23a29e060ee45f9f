//! Inbound events as seen by the receiver.

use chrono::{DateTime, Utc};
use std::fmt;

use super::HookName;

/// The provider that sent a webhook, taken from the first path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// GitHub. Always authenticated with `x-hub-signature-256`.
    GitHub,
    /// Any other provider, by its path segment.
    Other(String),
}

impl Source {
    pub fn from_path_segment(segment: &str) -> Self {
        if segment.eq_ignore_ascii_case("github") {
            Source::GitHub
        } else {
            Source::Other(segment.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Source::GitHub => "github",
            Source::Other(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted webhook, immutable once built.
///
/// Events have no identity of their own; once spooled they are known by the
/// spool entry's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub hook: HookName,
    pub source: Source,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(hook: HookName, source: Source, payload: impl Into<Vec<u8>>) -> Self {
        Event {
            hook,
            source,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}
