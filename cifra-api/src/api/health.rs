//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use cifra_common::time::iso_timestamp;
use serde::Serialize;

use crate::api::middleware::route_not_found;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health
///
/// Unversioned and never touches the database, so it answers even while the
/// pool is not yet established.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: iso_timestamp(),
        service: "cifra-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.startup_time.elapsed().as_secs(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check).fallback(route_not_found))
}
