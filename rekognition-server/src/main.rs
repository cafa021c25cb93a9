//! Rekognition Server - HTTP API for on-demand camera scans
//!
//! Loads the platform configuration named by `REKOGNITION_CONFIG`, builds one
//! entity per camera and exposes:
//! - POST /scan/{entity_id} - Scan a camera now
//! - GET /entities - Current state of every entity
//! - GET /entities/{entity_id} - Current state of one entity
//! - GET /health - Health check

use std::sync::Arc;

use anyhow::{Context, Result};
use rekognition_core::{setup_platform, Host, MockRekognition, PlatformConfig, Services};
use rekognition_server::{create_router_with_config, AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rekognition_server=info,rekognition_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let platform =
        PlatformConfig::load_from_env().context("Failed to load platform configuration")?;

    let (services, backend) = if config.use_mock_client {
        tracing::warn!("Using MOCK Rekognition client (no faces or labels are ever detected)");
        (Services::new(Arc::new(MockRekognition::new())), "mock")
    } else {
        (Services::aws(&platform).await, "aws")
    };

    let host = Host::from_config(&platform)?;
    let entities = setup_platform(&platform, &services, &host)?;
    for entity in &entities {
        tracing::info!(
            entity_id = entity.entity_id(),
            camera = entity.camera_entity(),
            "Entity ready"
        );
    }

    let app = create_router_with_config(AppState::new(entities, backend), &config);

    let addr = config.socket_addr();
    tracing::info!("Rekognition server listening on {}", addr);
    tracing::info!("Request timeout: {}s", config.timeout_secs);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
