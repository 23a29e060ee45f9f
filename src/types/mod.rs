//! Core domain types shared by the receiver and the dispatcher.

pub mod event;
pub mod ids;

pub use event::{Event, Source};
pub use ids::{EntryId, HookName, InvalidHookName, MAX_HOOK_NAME_LEN};
