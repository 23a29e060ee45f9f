//! HTTP receiver: the unprivileged, internet-facing side.
//!
//! The receiver authenticates deliveries and spools them. It never runs an
//! action and never waits for the dispatcher.
//!
//! # Endpoints
//!
//! - `POST /{source}/{hook}` - Accepts a webhook (returns 200 "Done")
//! - `GET /health` - Returns 200 if the server is running

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::spool::Spool;
use crate::types::Source;
use crate::webhooks::{SecretSource, SecretsFile};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{HEADER_SIGNATURE, WebhookError, webhook_handler};

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Everything the receiver needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Address to listen on.
    pub bind: SocketAddr,

    /// Spool directory shared with the dispatcher.
    pub spool_dir: PathBuf,

    /// JSON file mapping hook names to shared secrets.
    pub secrets_path: PathBuf,

    /// Sources accepted without a signature. `github` is never among them.
    pub unsigned_sources: Vec<String>,
}

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    spool: Spool,

    /// Consulted on every authenticated request, so secret edits apply
    /// without a restart.
    secrets: Arc<dyn SecretSource>,

    /// Lowercased names of sources that skip signature verification.
    unsigned_sources: HashSet<String>,
}

impl AppState {
    pub fn new(spool: Spool, secrets: Arc<dyn SecretSource>) -> Self {
        Self::with_unsigned_sources(spool, secrets, std::iter::empty::<String>())
    }

    pub fn with_unsigned_sources<I, S>(spool: Spool, secrets: Arc<dyn SecretSource>, unsigned: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unsigned_sources = unsigned
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();

        AppState {
            inner: Arc::new(AppStateInner {
                spool,
                secrets,
                unsigned_sources,
            }),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::with_unsigned_sources(
            Spool::new(&config.spool_dir),
            Arc::new(SecretsFile::new(&config.secrets_path)),
            &config.unsigned_sources,
        )
    }

    pub fn spool(&self) -> &Spool {
        &self.inner.spool
    }

    pub fn secrets(&self) -> &dyn SecretSource {
        self.inner.secrets.as_ref()
    }

    /// Whether deliveries from `source` must carry a valid signature.
    pub fn requires_signature(&self, source: &Source) -> bool {
        match source {
            Source::GitHub => true,
            Source::Other(name) => !self
                .inner
                .unsigned_sources
                .contains(&name.to_ascii_lowercase()),
        }
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/{source}/{hook}", post(webhook_handler))
        .with_state(app_state)
}
