//! Error alerts through Sentry.
//!
//! Console logging and alerting share one `tracing` subscriber. The Sentry
//! layer is always installed; it only sends anything once a client has been
//! bound by [`init_sentry`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sentry::integrations::tracing::EventFilter;
use sentry::types::Dsn;
use thiserror::Error;
use tracing::{error, info};

/// Why the DSN file could not be used.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to read Sentry DSN file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sentry DSN file {0} is empty")]
    Empty(PathBuf),

    #[error("invalid Sentry DSN in {path}: {message}")]
    InvalidDsn { path: PathBuf, message: String },
}

/// Reads and parses a DSN from `path`, ignoring surrounding whitespace.
pub fn load_sentry_dsn(path: &Path) -> Result<Dsn, TelemetryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| TelemetryError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let dsn = raw.trim();
    if dsn.is_empty() {
        return Err(TelemetryError::Empty(path.to_path_buf()));
    }
    Dsn::from_str(dsn).map_err(|e| TelemetryError::InvalidDsn {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// The `tracing` layer that turns ERROR events into Sentry events.
pub fn sentry_layer<S>() -> sentry::integrations::tracing::SentryLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    sentry::integrations::tracing::layer()
        .event_filter(|md| match *md.level() {
            tracing::Level::ERROR => EventFilter::Event,
            _ => EventFilter::Ignore,
        })
        .span_filter(|md| matches!(*md.level(), tracing::Level::ERROR | tracing::Level::WARN))
}

/// Binds a Sentry client if `dsn_file` holds a usable DSN.
///
/// Must be called after the subscriber is installed so failures are logged.
/// The returned guard flushes pending events when dropped; keep it alive for
/// the life of the process.
pub fn init_sentry(dsn_file: &Path) -> Option<sentry::ClientInitGuard> {
    let dsn = match load_sentry_dsn(dsn_file) {
        Ok(dsn) => dsn,
        Err(e) => {
            error!(error = %e, "Error alerts disabled");
            return None;
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    });
    info!(file = %dsn_file.display(), "Error alerts enabled");
    Some(guard)
}
