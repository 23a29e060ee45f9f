//! Dispatcher timing configuration.
//!
//! Filesystem notifications are the primary trigger for draining, but they
//! can be missed (watch limits, network filesystems, events dropped under
//! load). A periodic poll bounds how long an entry can sit unnoticed.

use std::time::Duration;

/// Default fallback poll interval (30 seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Shortest poll interval used; tokio intervals panic on a zero period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default age after which a leftover temp file is swept (1 hour).
pub const DEFAULT_STALE_TEMP_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Interval between fallback polls of the spool directory.
    pub poll_interval: Duration,

    /// Temp files older than this are removed at startup.
    pub stale_temp_age: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            stale_temp_age: Duration::from_secs(DEFAULT_STALE_TEMP_SECS),
        }
    }
}

impl DispatcherConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_stale_temp_age(mut self, stale_temp_age: Duration) -> Self {
        self.stale_temp_age = stale_temp_age;
        self
    }
}
