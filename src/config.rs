//! Command-line configuration.
//!
//! Every option can also come from the environment so the two halves can be
//! configured from service unit files without long command lines.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::dispatcher::DispatcherConfig;
use crate::server::{DEFAULT_BIND, ReceiverConfig};

#[derive(Debug, Parser)]
#[command(name = "jeeves")]
#[command(version, about = "Relay webhooks from an unprivileged receiver to a privileged dispatcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// File holding the Sentry DSN that ERROR events are reported to
    #[arg(long, global = true, env = "JEEVES_SENTRY_DSN_FILE")]
    pub sentry_dsn_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept webhooks over HTTP and spool them
    Listen(ListenArgs),

    /// Watch the spool and run the matching actions
    Dispatch(DispatchArgs),
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Address to listen on
    #[arg(long, env = "JEEVES_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Spool directory shared with the dispatcher
    #[arg(long, env = "JEEVES_SPOOL_DIR")]
    pub spool_dir: PathBuf,

    /// JSON file mapping hook names to shared secrets
    #[arg(long, env = "JEEVES_SECRETS")]
    pub secrets: PathBuf,

    /// Source accepted without a signature (repeatable; never applies to github)
    #[arg(long = "unsigned-source", value_name = "SOURCE", env = "JEEVES_UNSIGNED_SOURCES", value_delimiter = ',')]
    pub unsigned_sources: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Spool directory shared with the receiver
    #[arg(long, env = "JEEVES_SPOOL_DIR")]
    pub spool_dir: PathBuf,

    /// JSON file describing hook routes and their actions
    #[arg(long, env = "JEEVES_HANDLERS")]
    pub handlers: PathBuf,

    /// Seconds between fallback polls of the spool
    #[arg(long, env = "JEEVES_POLL_INTERVAL_SECS", default_value_t = crate::dispatcher::DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Age in seconds after which leftover temp files are removed
    #[arg(long, env = "JEEVES_STALE_TEMP_SECS", default_value_t = crate::dispatcher::DEFAULT_STALE_TEMP_SECS)]
    pub stale_temp_secs: u64,
}

impl ListenArgs {
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            bind: self.bind,
            spool_dir: self.spool_dir.clone(),
            secrets_path: self.secrets.clone(),
            unsigned_sources: self.unsigned_sources.clone(),
        }
    }
}

impl DispatchArgs {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_stale_temp_age(Duration::from_secs(self.stale_temp_secs))
    }
}
