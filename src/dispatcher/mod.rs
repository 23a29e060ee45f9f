//! The privileged side: watches the spool and runs actions.
//!
//! # Architecture
//!
//! - Single dispatcher per spool, enforced by process supervision
//! - Two states: **Idle** (waiting for a filesystem notification or the
//!   fallback poll) and **Draining** (handling pending entries oldest first)
//! - Strictly serial: actions touch shared working trees, so no two entries
//!   are ever handled at once
//! - Every observed entry is released after its action returns, whatever the
//!   outcome; retries are the webhook provider's job
//!
//! # Module Structure
//!
//! - [`dispatcher`]: the drain loop and per-entry handling
//! - [`watcher`]: filesystem change notifications for the spool directory
//! - [`config`]: poll interval and housekeeping settings

mod config;
#[allow(clippy::module_inception)]
mod dispatcher;
mod watcher;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_STALE_TEMP_SECS, DispatcherConfig, MIN_POLL_INTERVAL};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherState, DrainReport};
pub use watcher::SpoolWatcher;
