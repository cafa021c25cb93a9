//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    /// Rekognition backend: "aws" or "mock"
    pub backend: &'static str,
    /// Number of configured entities
    pub entities: usize,
}

/// GET /health - Health check endpoint
///
/// Reports "degraded" when no entity is configured.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.is_empty() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "rekognition-server",
        backend: state.backend,
        entities: state.len(),
    })
}
