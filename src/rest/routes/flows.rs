//! Flow definition endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::flows::FlowDefinition;
use crate::rest::dto::FlowSummary;
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;

/// List all flows
pub async fn list(State(state): State<ApiState>) -> Json<Vec<FlowSummary>> {
    Json(state.flows.all().map(FlowSummary::from).collect())
}

/// Full definition of one flow, so a console can render its steps
pub async fn get_one(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<FlowDefinition>, ApiError> {
    state
        .flows
        .get(&key)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Flow '{}' not found", key)))
}
