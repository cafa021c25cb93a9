//! Scan handler
//!
//! Triggers one scan of an entity and returns the outcome with the new state.

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    Json,
};
use rekognition_core::{EntityState, ScanReport};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Response for a completed scan
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub entity_id: String,
    pub count: usize,
    pub events_fired: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_latest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_timestamped: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<String>,
    /// Save failures, which never fail the scan
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub save_errors: Vec<String>,
    pub state: EntityState,
}

impl ScanResponse {
    fn new(report: ScanReport, state: EntityState) -> Self {
        Self {
            entity_id: report.entity_id,
            count: report.count,
            events_fired: report.events_fired,
            timestamp: report.timestamp,
            saved_latest: report.saved.latest,
            saved_timestamped: report.saved.timestamped,
            uploaded: report.saved.uploaded,
            save_errors: report.saved.errors,
            state,
        }
    }
}

/// POST /scan/{entity_id} - Scan the entity's camera now
///
/// Scans of the same entity are serialized. A failed scan leaves the
/// entity state untouched.
pub async fn scan_handler(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<ScanResponse>, ApiError> {
    let entity = state
        .entity(&entity_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown entity {entity_id}")))?;

    let (report, current) = entity.scan().await?;
    info!(entity_id = %entity_id, count = report.count, "Scan requested over HTTP");

    Ok(Json(ScanResponse::new(report, current)))
}
