//! Actions the dispatcher can run, and the table that picks one per hook.
//!
//! An [`Action`] is an opaque side-effecting procedure: pull a repository,
//! rebuild containers, restart a service. The dispatcher only knows how to
//! look one up ([`HandlerRegistry::resolve`]) and call it once per spool
//! entry ([`Action::invoke`]).
//!
//! Actions must tolerate redelivery. An entry is only released after its
//! action returns, so a crash (or an action that restarts the dispatcher
//! itself) means the same payload is handed over again on the next start.

use std::io;

use thiserror::Error;

use crate::types::HookName;

pub mod command;
pub mod registry;

pub use command::{CommandAction, Step};
pub use registry::{HandlerRegistry, Matcher, RegistryError};

/// What an action is given to work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The hook the event was posted to.
    pub hook: HookName,
    /// The raw payload bytes as received.
    pub payload: Vec<u8>,
}

/// Errors reported by an action.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A step ran and exited unsuccessfully. `code` is `None` if it was killed
    /// by a signal.
    #[error("action {action}: `{command}` failed with exit code {code:?}")]
    ActionFailed {
        action: String,
        command: String,
        code: Option<i32>,
    },

    /// A step could not be started at all.
    #[error("action {action}: failed to start `{command}`: {source}")]
    Spawn {
        action: String,
        command: String,
        #[source]
        source: io::Error,
    },

    /// A step's working directory could not be enumerated.
    #[error("action {action}: failed to list {path}: {source}")]
    ListDir {
        action: String,
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A named procedure run for matching hooks.
///
/// `invoke` blocks until the procedure finishes; the dispatcher runs it off
/// the async runtime and never runs two at once.
pub trait Action: Send + Sync {
    /// The name used in logs (e.g. `apps`, `codenames`).
    fn name(&self) -> &str;

    /// Runs the procedure for one event.
    fn invoke(&self, invocation: &Invocation) -> Result<(), HandlerError>;
}
