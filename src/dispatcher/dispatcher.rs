//! Spool drain loop.
//!
//! # Event Processing Flow
//!
//! 1. Sweep stale temp files left by crashed writers (startup only)
//! 2. Wait in **Idle** for a filesystem notification or the fallback poll
//! 3. In **Draining**, list the spool and take entries oldest first
//! 4. Resolve the hook, run its action to completion, then release the entry
//! 5. List again; go back to Idle once nothing new is pending
//!
//! # Critical Invariant
//!
//! An entry is released only after its action has returned (successfully or
//! not). A dispatcher killed mid-action leaves the entry in place and handles
//! it again after restart. An entry whose payload cannot be read is never
//! released; it stays on disk for the next run.

use std::collections::HashSet;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::handlers::{HandlerError, HandlerRegistry, Invocation};
use crate::spool::{Spool, SpoolEntry, SpoolError};
use crate::types::{EntryId, HookName};

use super::config::{DispatcherConfig, MIN_POLL_INTERVAL};
use super::watcher::SpoolWatcher;

/// Errors from handling spool entries.
///
/// Only [`DispatchError::Spool`] from listing the directory ever leaves
/// [`Dispatcher::drain_all`]; the rest are per-entry outcomes that are only
/// logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route matches the entry's hook.
    #[error("no handler registered for hook {0}")]
    UnmatchedHook(HookName),

    /// The action ran and failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The action panicked.
    #[error("action {action} panicked: {message}")]
    HandlerPanicked { action: String, message: String },

    /// Spool operation failed.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

/// Result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Where the dispatcher is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for new spool activity.
    Idle,
    /// Handling pending entries.
    Draining,
}

/// Counts from one [`Dispatcher::drain_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries whose action succeeded.
    pub handled: usize,
    /// Entries whose action failed or panicked.
    pub failed: usize,
    /// Entries with no matching route.
    pub unmatched: usize,
    /// Entries whose payload could not be read.
    pub unreadable: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.handled + self.failed + self.unmatched + self.unreadable
    }
}

/// The single consumer of a spool.
pub struct Dispatcher {
    spool: Spool,
    registry: HandlerRegistry,
    config: DispatcherConfig,
    state: DispatcherState,

    /// Entries already dealt with in this run that are still on disk, either
    /// because their release failed or their payload was unreadable. Pruned
    /// to the live listing on every pass.
    seen: HashSet<EntryId>,
}

impl Dispatcher {
    pub fn new(spool: Spool, registry: HandlerRegistry, config: DispatcherConfig) -> Self {
        Dispatcher {
            spool,
            registry,
            config,
            state: DispatcherState::Idle,
            seen: HashSet::new(),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    // ─── Async Event Loop ─────────────────────────────────────────────────────────

    /// Runs until `shutdown` is cancelled.
    ///
    /// The first poll tick fires immediately, so entries left over from a
    /// previous run are handled before waiting for anything new.
    ///
    /// # Errors
    ///
    /// Fails only if the spool directory cannot be created. Everything after
    /// startup is logged and retried on the next wakeup.
    #[instrument(skip_all, fields(spool = %self.spool.dir().display()))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        std::fs::create_dir_all(self.spool.dir()).map_err(SpoolError::Io)?;
        info!(routes = self.registry.len(), "Dispatcher started");

        match self.spool.cleanup_stale_temp(self.config.stale_temp_age) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed stale spool temp files"),
            Err(e) => warn!(error = %e, "Failed to sweep stale spool temp files"),
        }

        let mut watcher = match SpoolWatcher::spawn(self.spool.dir()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "Filesystem notifications unavailable, relying on polling");
                None
            }
        };

        // The fields are public, so the builder's clamp may have been bypassed.
        let mut poll = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let mut watcher_closed = false;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }

                _ = poll.tick() => {
                    trace!("Fallback poll");
                }

                woke = async {
                    match watcher.as_mut() {
                        Some(w) => w.changed().await,
                        None => std::future::pending().await,
                    }
                } => {
                    trace!("Spool changed");
                    watcher_closed = !woke;
                }
            }

            if watcher_closed {
                warn!("Spool watcher stopped, relying on polling");
                watcher = None;
            }

            if let Err(e) = self.drain_all(&shutdown).await {
                error!(error = %e, "Failed to drain spool");
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Handles every pending entry, including ones that arrive meanwhile.
    ///
    /// Stops early, leaving the rest pending, once `shutdown` is cancelled.
    pub async fn drain_all(&mut self, shutdown: &CancellationToken) -> Result<DrainReport> {
        self.state = DispatcherState::Draining;
        let result = self.drain_passes(shutdown).await;
        self.state = DispatcherState::Idle;
        result
    }

    async fn drain_passes(&mut self, shutdown: &CancellationToken) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        loop {
            let listed: Vec<SpoolEntry> = self.spool.drain()?.collect();
            let live: HashSet<&EntryId> = listed.iter().map(|e| &e.id).collect();
            self.seen.retain(|id| live.contains(id));

            let fresh: Vec<SpoolEntry> = listed
                .iter()
                .filter(|e| !self.seen.contains(&e.id))
                .cloned()
                .collect();
            if fresh.is_empty() {
                break;
            }

            for entry in fresh {
                if shutdown.is_cancelled() {
                    debug!("Shutdown requested, leaving remaining entries pending");
                    return Ok(report);
                }
                self.handle_entry(&entry, &mut report).await;
            }
        }

        if report.total() > 0 {
            info!(
                handled = report.handled,
                failed = report.failed,
                unmatched = report.unmatched,
                unreadable = report.unreadable,
                "Spool drained"
            );
        }
        Ok(report)
    }

    /// Dispatches one entry, records the outcome and releases the entry.
    ///
    /// Unreadable entries are left on disk and only marked as seen, so a
    /// restart (or an operator fixing permissions) gets another go at them.
    async fn handle_entry(&mut self, entry: &SpoolEntry, report: &mut DrainReport) {
        self.seen.insert(entry.id.clone());

        match self.dispatch(entry).await {
            Ok(action) => {
                info!(entry = %entry.id, hook = %entry.hook, action = %action, "Action completed");
                report.handled += 1;
            }
            Err(e @ DispatchError::UnmatchedHook(_)) => {
                warn!(entry = %entry.id, error = %e, "Discarding entry");
                report.unmatched += 1;
            }
            Err(e @ DispatchError::Spool(_)) => {
                warn!(entry = %entry.id, error = %e, "Could not read entry payload, leaving it pending");
                report.unreadable += 1;
                return;
            }
            Err(e) => {
                error!(entry = %entry.id, hook = %entry.hook, error = %e, "Action failed");
                report.failed += 1;
            }
        }

        if let Err(e) = self.spool.release(entry) {
            error!(entry = %entry.id, error = %e, "Failed to release entry");
        }
    }

    /// Resolves and runs the action for one entry, returning the action name.
    async fn dispatch(&self, entry: &SpoolEntry) -> Result<String> {
        let action = self
            .registry
            .resolve(entry.hook.as_str())
            .ok_or_else(|| DispatchError::UnmatchedHook(entry.hook.clone()))?;
        let name = action.name().to_string();

        let invocation = Invocation {
            hook: entry.hook.clone(),
            payload: entry.read_payload()?,
        };

        debug!(entry = %entry.id, hook = %entry.hook, action = %name, "Invoking action");

        // Actions block on child processes; keep them off the async workers.
        match tokio::task::spawn_blocking(move || action.invoke(&invocation)).await {
            Ok(Ok(())) => Ok(name),
            Ok(Err(e)) => Err(e.into()),
            Err(join) => Err(DispatchError::HandlerPanicked {
                action: name,
                message: join.to_string(),
            }),
        }
    }
}
