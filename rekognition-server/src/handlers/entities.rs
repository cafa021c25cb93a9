//! Entity state handlers
//!
//! Reads serve the last published snapshot and never wait for a scan.

use axum::{
    extract::{Path, State},
    Json,
};
use rekognition_core::EntityState;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /entities - Current state of every entity
pub async fn list_entities(State(state): State<AppState>) -> Json<Vec<EntityState>> {
    Json(state.entities().map(|entity| entity.state()).collect())
}

/// GET /entities/{entity_id} - Current state of one entity
pub async fn get_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, ApiError> {
    let entity = state
        .entity(&entity_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown entity {entity_id}")))?;
    Ok(Json(entity.state()))
}
