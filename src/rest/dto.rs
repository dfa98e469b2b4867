//! Data Transfer Objects for the sandbox API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flows::FlowDefinition;
use crate::rest::state::{StoredEntity, WorkflowRecord};

// =============================================================================
// Health DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub flow_count: usize,
    pub entity_count: usize,
    pub workflow_request_count: usize,
}

// =============================================================================
// Flow DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct FlowSummary {
    pub key: String,
    pub name: String,
    pub collection: String,
    pub step_count: usize,
    pub steps: Vec<String>,
}

impl From<&FlowDefinition> for FlowSummary {
    fn from(flow: &FlowDefinition) -> Self {
        Self {
            key: flow.key.clone(),
            name: flow.name.clone(),
            collection: flow.collection.clone(),
            step_count: flow.steps.len(),
            steps: flow.steps.iter().map(|s| s.label.clone()).collect(),
        }
    }
}

// =============================================================================
// Entity DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IdBody {
    pub id: String,
}

/// Answer to a create call, nested under `data`
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub data: IdBody,
}

/// Full entity, fields flattened next to the id
#[derive(Debug, Serialize, Deserialize)]
pub struct EntityResponse {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<&StoredEntity> for EntityResponse {
    fn from(entity: &StoredEntity) -> Self {
        Self {
            id: entity.id.clone(),
            fields: entity.fields.clone(),
        }
    }
}

// =============================================================================
// Workflow DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAccepted {
    pub id: String,
    pub status: String,
    pub reference_id: String,
    pub action_key: String,
}

impl From<&WorkflowRecord> for WorkflowAccepted {
    fn from(record: &WorkflowRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: "PENDING".to_string(),
            reference_id: record.request.reference_id.to_string(),
            action_key: record.request.action_key.clone(),
        }
    }
}
