use std::net::SocketAddr;

use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[cfg(test)]
mod test_support;

use crate::config::settings::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reverse_server=info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("failed to load configuration")?;
    let state = AppState::new(config);

    let purged = modules::reverse::job::purge_upload_dir(&state.config.upload_dir)
        .await
        .context("failed to prepare upload directory")?;
    if purged > 0 {
        info!("Removed {} temp files left by a previous run", purged);
    }
    state
        .store
        .recover(state.config.recovery)
        .await
        .context("failed to recover artifact directory")?;

    let shutdown = CancellationToken::new();
    let reclaimer = tokio::spawn(workers::reclaimer::start_reclamation_worker(
        state.store.clone(),
        state.config.sweep_interval(),
        shutdown.clone(),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server_port));
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    workers::join_worker("reclaimer", reclaimer).await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
