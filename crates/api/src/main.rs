use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lightning_events::WebhookDispatcher;
use lightning_fetch::SecureFetcher;
use lightning_pipeline::{
    JobQueue, ProcessorSettings, TranscriptionProcessor, UnconfiguredEngine, WavDecoder,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightning_api::config::ServiceConfig;
use lightning_api::router::build_app_router;
use lightning_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lightning_api=debug,lightning_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_queue_size = config.max_queue_size,
        "Loaded service configuration"
    );

    // --- Job processor ---
    let fetcher = SecureFetcher::new(config.fetch);
    let dispatcher = WebhookDispatcher::new(config.webhook, config.webhook_secret.clone());
    if !dispatcher.is_signing() {
        tracing::warn!("LIGHTNING_WEBHOOK_SECRET is not set, webhooks will be unsigned");
    }

    let mut processor = TranscriptionProcessor::new(
        Arc::new(UnconfiguredEngine),
        Arc::new(WavDecoder),
        fetcher,
        dispatcher,
        ProcessorSettings {
            default_chunk_size: config.chunk_size,
        },
    );
    processor
        .warm_up(
            &config.whisper_model,
            &config.whisper_compute_type,
            &config.align_langs,
        )
        .await;

    // --- Job queue ---
    let queue = Arc::new(JobQueue::new(config.max_queue_size));
    queue.start(processor).context("Failed to start job consumer")?;
    tracing::info!(capacity = queue.capacity(), "Job queue started");

    // --- App state / router ---
    let state = AppState {
        queue: Arc::clone(&queue),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address {:?}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!(
        queued = queue.len(),
        "Server stopped accepting connections, stopping job consumer"
    );
    let drained = queue
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if !drained {
        tracing::warn!("Job consumer did not finish before the shutdown timeout");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
