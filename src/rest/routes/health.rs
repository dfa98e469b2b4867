//! Health check and status endpoints.

use axum::{extract::State, Json};

use crate::rest::dto::{HealthResponse, StatusResponse};
use crate::rest::state::ApiState;

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Service status with store counters
pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let store = state.store.read().await;

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        flow_count: state.flows.len(),
        entity_count: store.entity_count(),
        workflow_request_count: store.workflow_requests().len(),
    })
}
