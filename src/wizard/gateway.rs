//! Collaborators the engine persists through
//!
//! The backend answers a save with either `{ "id": .. }` or
//! `{ "data": { "id": .. } }`; [`EntityRef::from_response`] is the only place
//! that knows about both shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::payload::StepPayload;
use super::types::EntityId;

/// Failure reported by a backend collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The server refused the payload (validation, conflict, missing entity)
    #[error("rejected by server: {message}")]
    Rejected { message: String },
    /// The request never produced a usable answer
    #[error("transport error: {}", .message.as_deref().unwrap_or("no response"))]
    Transport { message: Option<String> },
}

impl GatewayError {
    pub fn rejected(message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        GatewayError::Transport {
            message: Some(message.into()),
        }
    }

    /// Transport failure without any server-supplied text
    pub fn silent() -> Self {
        GatewayError::Transport { message: None }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, GatewayError::Rejected { .. })
    }

    /// Banner text: the server message when there is one, else `fallback`
    pub fn banner(&self, fallback: &str) -> String {
        match self {
            GatewayError::Rejected { message } => message.clone(),
            GatewayError::Transport {
                message: Some(message),
            } if !message.trim().is_empty() => message.clone(),
            GatewayError::Transport { .. } => fallback.to_string(),
        }
    }
}

/// Identifier as the backend sends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for EntityId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(id) => EntityId::new(id),
            RawId::Number(id) => EntityId::new(id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdOnly {
    pub id: RawId,
}

/// Both answer shapes of a save call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SaveResponse {
    Direct(IdOnly),
    Nested { data: IdOnly },
}

/// Canonical reference to a persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self { id: id.into() }
    }

    pub fn from_response(response: SaveResponse) -> Self {
        let raw = match response {
            SaveResponse::Direct(IdOnly { id }) | SaveResponse::Nested { data: IdOnly { id } } => id,
        };
        Self { id: raw.into() }
    }

    /// Decode a raw JSON answer of either shape
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        serde_json::from_value::<SaveResponse>(value)
            .map(Self::from_response)
            .map_err(|e| GatewayError::transport(format!("Unexpected save response: {}", e)))
    }
}

/// Downstream approval request fired when the final step completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub reference_id: EntityId,
    pub reference_type: String,
    pub module_name: String,
    pub action_key: String,
    pub payload_json: String,
}

/// Persists one step of an entity
#[async_trait]
pub trait StepGateway: Send + Sync {
    /// Save `payload` for the 1-based `step_number`.
    ///
    /// Not idempotent: callers must not submit the same step twice concurrently.
    async fn save(
        &self,
        step_number: usize,
        payload: &StepPayload,
        is_editing: bool,
        entity_id: Option<&EntityId>,
    ) -> Result<EntityRef, GatewayError>;
}

/// Loads the current server representation of an entity
#[async_trait]
pub trait HydrationSource: Send + Sync {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Map<String, Value>, GatewayError>;
}

/// Submits the completion request of a finished flow
#[async_trait]
pub trait WorkflowSubmitter: Send + Sync {
    async fn submit(&self, request: &WorkflowRequest) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_and_nested_ids_normalize_identically() {
        let direct = EntityRef::from_value(json!({"id": "42"})).unwrap();
        let nested = EntityRef::from_value(json!({"data": {"id": "42"}})).unwrap();
        assert_eq!(direct, nested);
        assert_eq!(direct.id.as_str(), "42");
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let entity = EntityRef::from_value(json!({"data": {"id": 1007, "name": "x"}})).unwrap();
        assert_eq!(entity.id, EntityId::new("1007"));
    }

    #[test]
    fn test_response_without_id_is_transport_error() {
        let err = EntityRef::from_value(json!({"ok": true})).unwrap_err();
        assert!(!err.is_rejected());
    }

    #[test]
    fn test_banner_prefers_server_message() {
        let fallback = "Unable to save step. Please try again.";
        assert_eq!(
            GatewayError::rejected("IBAN already registered").banner(fallback),
            "IBAN already registered"
        );
        assert_eq!(
            GatewayError::transport("gateway timeout").banner(fallback),
            "gateway timeout"
        );
        assert_eq!(GatewayError::silent().banner(fallback), fallback);
        assert_eq!(GatewayError::transport("  ").banner(fallback), fallback);
    }

    #[test]
    fn test_workflow_request_serializes_camel_case() {
        let request = WorkflowRequest {
            reference_id: EntityId::new("42"),
            reference_type: "ESCROW_ACCOUNT".to_string(),
            module_name: "escrow".to_string(),
            action_key: "CREATE".to_string(),
            payload_json: "{}".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["referenceId"], json!("42"));
        assert_eq!(value["referenceType"], json!("ESCROW_ACCOUNT"));
        assert_eq!(value["moduleName"], json!("escrow"));
        assert_eq!(value["actionKey"], json!("CREATE"));
        assert_eq!(value["payloadJson"], json!("{}"));
    }
}
