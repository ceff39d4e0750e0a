use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub tokens_by_state: HashMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Operational maintenance entry point; the background cleaner runs the same
/// path on an interval.
pub async fn admin_cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> Result<Json<JSend<CleanupResponse>>, ApiError> {
    let batch = req
        .batch_size
        .unwrap_or(state.config.tokens.cleanup_batch_size);
    if batch == 0 {
        return Err(ApiError::bad_request("batch_size must be greater than 0"));
    }

    let deleted_count = state.service.cleanup(batch)?;
    tracing::info!(deleted_count, "Manual cleanup ran");

    Ok(JSend::success(CleanupResponse { deleted_count }))
}

pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<StatsResponse>>, ApiError> {
    let counts = state.service.stats()?;
    let tokens_by_state = counts
        .into_iter()
        .map(|(state, count)| (state.to_string(), count))
        .collect();

    Ok(JSend::success(StatsResponse { tokens_by_state }))
}

/// Purge all token data - gated behind TEST_MODE.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<CleanupResponse>>, ApiError> {
    let purged = state
        .service
        .db()
        .purge_all()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    tracing::warn!(purged, "Purged all token data");

    Ok(JSend::success(CleanupResponse {
        deleted_count: purged as usize,
    }))
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
