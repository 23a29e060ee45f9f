use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use jeeves::config::{Cli, Command, DispatchArgs, ListenArgs};
use jeeves::dispatcher::Dispatcher;
use jeeves::handlers::HandlerRegistry;
use jeeves::server::{AppState, build_router};
use jeeves::spool::Spool;
use jeeves::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let console = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "jeeves=info".into()),
    );
    tracing_subscriber::registry()
        .with(console)
        .with(telemetry::sentry_layer())
        .init();

    // Flushes queued alerts when main returns.
    let _sentry_guard = cli
        .sentry_dsn_file
        .as_deref()
        .and_then(telemetry::init_sentry);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    match cli.command {
        Command::Listen(args) => listen(args, shutdown).await,
        Command::Dispatch(args) => dispatch(args, shutdown).await,
    }
}

async fn listen(args: ListenArgs, shutdown: CancellationToken) -> Result<()> {
    let config = args.receiver_config();
    let state = AppState::from_config(&config);
    state.spool().check_publishable().with_context(|| {
        format!(
            "spool directory {} cannot publish entries (it must be writable and support hard links)",
            config.spool_dir.display()
        )
    })?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        addr = %config.bind,
        spool = %config.spool_dir.display(),
        "Receiver listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Receiver shutting down");
        })
        .await
        .context("receiver failed")?;

    Ok(())
}

async fn dispatch(args: DispatchArgs, shutdown: CancellationToken) -> Result<()> {
    let registry = HandlerRegistry::from_file(&args.handlers)
        .with_context(|| format!("failed to load handlers from {}", args.handlers.display()))?;
    if registry.is_empty() {
        warn!("No routes configured; every entry will be discarded");
    }

    let dispatcher = Dispatcher::new(Spool::new(&args.spool_dir), registry, args.dispatcher_config());
    dispatcher.run(shutdown).await.context("dispatcher failed")?;

    Ok(())
}

/// Cancels `token` on Ctrl-C or, on unix, SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    token.cancel();
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    token.cancel();
}
