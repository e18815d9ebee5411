use std::sync::Arc;

use axum::routing::get;
use core_config::server::ServerConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use http_metrics::{MetricsConfig, Middleware, PrometheusRecorder};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

mod routes;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);

    let server = ServerConfig::from_env()?;
    let metrics_config = MetricsConfig::from_env()?;

    let recorder = PrometheusRecorder::with_prefix(&metrics_config.prefix);
    let handle = recorder.install()?;

    info!(
        service = %metrics_config.service,
        grouped_status = metrics_config.grouped_status,
        "HTTP metrics enabled"
    );

    let mdlw = Middleware::new(metrics_config.into_middleware_config(Some(Arc::new(recorder))));

    // Added after the metrics layer: scrapes are not measured.
    let app = routes::router(mdlw).route(
        &server.metrics_path,
        get(move || async move { handle.render() }),
    );

    let listener = TcpListener::bind(server.address()).await?;
    info!(address = %server.address(), metrics_path = %server.metrics_path, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully");
        },
    }
}
