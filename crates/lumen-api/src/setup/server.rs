//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use lumen_core::Config;
use lumen_worker::WorkerHandle;

/// Serve until Ctrl+C / SIGTERM, then stop the worker pool.
pub async fn start_server(config: &Config, app: Router, workers: WorkerHandle) -> Result<()> {
    let addr = &config.base.server_addr;
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        queue_capacity = config.scan.queue_capacity,
        workers = config.scan.workers,
        scanner = %config.scan.command,
        default_runner = %config.scan.default_runner,
        "Server ready and accepting connections"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    workers.shutdown();
    workers.join().await;

    served?;
    Ok(())
}

/// Signal handler for graceful shutdown
///
/// # Panics
/// Panics if the Ctrl+C or (on Unix) SIGTERM handler cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
