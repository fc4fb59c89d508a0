//! Scoreledger server
//!
//! # Usage
//!
//! ```bash
//! scoreledger-server --config scoreledger.toml
//! SCORELEDGER_BIND=0.0.0.0:5000 scoreledger-server --model model.json
//! ```

use anyhow::Context;
use clap::Parser;
use scoreledger_api::{build_service, create_router, init_tracing, AppState, ServerArgs};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerArgs::parse()
        .into_config()
        .context("Failed to load configuration")?;

    init_tracing(config.log_format);

    let service = build_service(&config)?;
    let app = create_router(AppState::new(Arc::new(service)), &config);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(address = %config.bind, "Scoreledger server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Scoreledger server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
