//! Workflow (approval) request endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use tracing::info;

use crate::rest::dto::WorkflowAccepted;
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;
use crate::wizard::WorkflowRequest;

/// Accept an approval request for a completed entity
pub async fn submit(
    State(state): State<ApiState>,
    Json(request): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowAccepted>), ApiError> {
    let flow = state
        .flows
        .all()
        .find(|f| f.reference_type == request.reference_type)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown reference type '{}'",
                request.reference_type
            ))
        })?;
    if flow.action_key != request.action_key || flow.module_name != request.module_name {
        return Err(ApiError::BadRequest(format!(
            "Action '{}' in module '{}' does not apply to {}",
            request.action_key, request.module_name, request.reference_type
        )));
    }

    // Payload is an opaque JSON document, but it has to be one
    serde_json::from_str::<Value>(&request.payload_json)?;

    let mut store = state.store.write().await;
    let reference_id = request.reference_id.as_str();
    if store.get(&flow.collection, reference_id).is_none() {
        return Err(ApiError::NotFound(format!(
            "Entity '{}' not found in {}",
            reference_id, flow.collection
        )));
    }
    if store.has_pending_request(&request.reference_type, reference_id) {
        return Err(ApiError::Conflict(format!(
            "Approval already pending for {} '{}'",
            request.reference_type, reference_id
        )));
    }

    let record = store.record_workflow(request);
    info!(
        reference_id = %record.request.reference_id,
        action = %record.request.action_key,
        "workflow request recorded"
    );

    Ok((StatusCode::CREATED, Json(WorkflowAccepted::from(record))))
}

/// Every request received so far
pub async fn list(State(state): State<ApiState>) -> Json<Vec<WorkflowRequest>> {
    let store = state.store.read().await;
    Json(
        store
            .workflow_requests()
            .iter()
            .map(|r| r.request.clone())
            .collect(),
    )
}
