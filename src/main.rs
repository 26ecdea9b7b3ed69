use dotenvy::dotenv;
use tokio::sync::watch;
use tracing::info;

use billing_core::infra::{
    app::create_app,
    config::AppConfig,
    error::InfraError,
    setup::{init_services, init_tracing, log_gateway_summary, spawn_workers},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let run_mode = config.run_mode;
    let bind_addr = config.bind_addr;
    log_gateway_summary(&config);

    let services = init_services(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = if run_mode.runs_workers() {
        spawn_workers(&services, shutdown_rx).await?
    } else {
        Vec::new()
    };
    info!(run_mode = %run_mode, workers = workers.len(), "Billing core started");

    if run_mode.runs_api() {
        let app = create_app(services.app_state.clone());
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(InfraError::TcpBind)?;

        info!("Backend listening at {}", &listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(InfraError::Server)?;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down, waiting for workers");
    shutdown_tx.send(true).ok();
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
