//! Admin route handlers.

use axum::extract::State;
use axum::Json;

use crate::error::Result;
use crate::models::{CountResponse, DeleteResponse, HealthResponse, StateResponse};
use crate::state::AppState;

/// `GET /api/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /api/state`
pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        mode: state.settings.mode.to_string(),
        destination: state.settings.destination.as_str().to_string(),
        middleware: state.settings.middleware.is_some(),
        endpoint: state.settings.endpoint.clone(),
    })
}

/// `GET /api/records/count`
pub async fn count_records(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    let count = state.cache.len()?;
    Ok(Json(CountResponse { count }))
}

/// `DELETE /api/records`
pub async fn delete_records(State(state): State<AppState>) -> Result<Json<DeleteResponse>> {
    state.cache.clear()?;
    tracing::info!("capture store wiped via admin API");
    Ok(Json(DeleteResponse { deleted: true }))
}
