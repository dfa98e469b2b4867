//! Shared state for the sandbox backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::flows::FlowRegistry;
use crate::wizard::WorkflowRequest;

/// One entity as the sandbox stores it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: String,
    pub fields: Map<String, Value>,
    /// 1-based step numbers saved so far
    pub saved_steps: BTreeSet<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredEntity {
    fn new(fields: Map<String, Value>, step_number: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fields,
            saved_steps: BTreeSet::from([step_number]),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Workflow request accepted by the sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: String,
    pub request: WorkflowRequest,
    pub received_at: DateTime<Utc>,
}

/// In-memory entity store keyed by collection, then id
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<String, HashMap<String, StoredEntity>>,
    workflow: Vec<WorkflowRecord>,
}

impl EntityStore {
    pub fn create(
        &mut self,
        collection: &str,
        fields: Map<String, Value>,
        step_number: usize,
    ) -> &StoredEntity {
        let entity = StoredEntity::new(fields, step_number);
        let id = entity.id.clone();
        let bucket = self.entities.entry(collection.to_string()).or_default();
        bucket.entry(id).or_insert(entity)
    }

    /// Merge `fields` into an existing entity; `None` when it does not exist
    pub fn update(
        &mut self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        step_number: usize,
    ) -> Option<&StoredEntity> {
        let entity = self.entities.get_mut(collection)?.get_mut(id)?;
        entity.fields.extend(fields);
        entity.saved_steps.insert(step_number);
        entity.updated_at = Utc::now();
        Some(entity)
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<&StoredEntity> {
        self.entities.get(collection)?.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().map(HashMap::len).sum()
    }

    pub fn record_workflow(&mut self, request: WorkflowRequest) -> &WorkflowRecord {
        self.workflow.push(WorkflowRecord {
            id: Uuid::new_v4().to_string(),
            request,
            received_at: Utc::now(),
        });
        let last = self.workflow.len() - 1;
        &self.workflow[last]
    }

    pub fn workflow_requests(&self) -> &[WorkflowRecord] {
        &self.workflow
    }

    pub fn has_pending_request(&self, reference_type: &str, reference_id: &str) -> bool {
        self.workflow.iter().any(|r| {
            r.request.reference_type == reference_type
                && r.request.reference_id.as_str() == reference_id
        })
    }
}

/// Shared state for the sandbox API
#[derive(Clone)]
pub struct ApiState {
    /// Flow definitions (read-only while serving)
    pub flows: Arc<FlowRegistry>,
    /// Entity store (thread-safe read-write access)
    pub store: Arc<RwLock<EntityStore>>,
}

impl ApiState {
    pub fn new(flows: FlowRegistry) -> Self {
        Self {
            flows: Arc::new(flows),
            store: Arc::new(RwLock::new(EntityStore::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_and_update() {
        let mut store = EntityStore::default();
        let id = store
            .create("fees", fields(json!({"name": "Setup"})), 1)
            .id
            .clone();
        assert!(Uuid::parse_str(&id).is_ok());

        let updated = store
            .update("fees", &id, fields(json!({"amount": 10})), 2)
            .unwrap();
        assert_eq!(updated.fields.len(), 2);
        assert_eq!(updated.saved_steps, BTreeSet::from([1, 2]));
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_update_unknown_entity() {
        let mut store = EntityStore::default();
        assert!(store.update("fees", "missing", Map::new(), 2).is_none());
        assert!(store.get("fees", "missing").is_none());
    }

    #[test]
    fn test_workflow_records() {
        let mut store = EntityStore::default();
        store.record_workflow(WorkflowRequest {
            reference_id: "42".into(),
            reference_type: "FEE".to_string(),
            module_name: "masterdata".to_string(),
            action_key: "CREATE_FEE".to_string(),
            payload_json: "{}".to_string(),
        });
        assert!(store.has_pending_request("FEE", "42"));
        assert!(!store.has_pending_request("PARTY", "42"));
        assert_eq!(store.workflow_requests().len(), 1);
    }
}
