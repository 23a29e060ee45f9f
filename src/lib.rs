//! Jeeves - relays webhooks from an unprivileged HTTP receiver to a
//! privileged dispatcher through a filesystem spool.
//!
//! The receiver ([`server`]) authenticates deliveries ([`webhooks`]) and
//! writes one entry per accepted event into the [`spool`]. The [`dispatcher`]
//! drains the spool in arrival order and runs the action the [`handlers`]
//! registry picks for each hook.

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod server;
pub mod spool;
pub mod telemetry;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
