//! HTTP client for the console backend
//!
//! One client serves one entity collection. It implements every backend seam
//! the wizard engine needs, so the binary wires a single value into
//! [`Collaborators`](crate::wizard::Collaborators).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::ApiError;
use crate::config::BackendConfig;
use crate::wizard::{
    EntityId, EntityRef, GatewayError, HydrationSource, StepDefinition, StepGateway, StepPayload,
    ValidationOutcome, ValidationReport, Validator, WorkflowRequest, WorkflowSubmitter,
};

const API_PREFIX: &str = "/api/v1";

/// Backend client scoped to one collection
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    collection: String,
    token: Option<String>,
    locale: String,
}

impl BackendClient {
    /// Build a client from config; the token is read from `token_env`
    pub fn new(config: &BackendConfig, collection: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        reqwest::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid backend base_url: {}", config.base_url))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection: collection.into(),
            token: config.token(),
            locale: "en".to_string(),
        })
    }

    /// Locale sent as `Accept-Language`
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, path)
    }

    fn create_url(&self, step_number: usize) -> String {
        self.url(&format!("{}/steps/{}", self.collection, step_number))
    }

    fn update_url(&self, entity_id: &EntityId, step_number: usize) -> String {
        self.url(&format!(
            "{}/{}/steps/{}",
            self.collection, entity_id, step_number
        ))
    }

    fn entity_url(&self, entity_id: &EntityId) -> String {
        self.url(&format!("{}/{}", self.collection, entity_id))
    }

    fn validate_url(&self, step_number: usize) -> String {
        self.url(&format!("{}/steps/{}/validate", self.collection, step_number))
    }

    fn workflow_url(&self) -> String {
        self.url("workflow/requests")
    }

    /// Send a request and decode the JSON answer (`Null` for an empty body)
    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let mut request = request
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, &self.locale);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        if !status.is_success() {
            let err = ApiError::from_status(status.as_u16(), &body);
            debug!("Backend answered {}: {}", status, err);
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// Server-side validation for one step; no persistence
    pub async fn validate_step(
        &self,
        step_number: usize,
        data: &Map<String, Value>,
    ) -> Result<ValidationReport, ApiError> {
        let value = self
            .send(self.client.post(self.validate_url(step_number)).json(data))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// A validator that delegates to this client
    pub fn validator(&self) -> RemoteValidator {
        RemoteValidator {
            client: self.clone(),
        }
    }
}

/// Unwrap `{ "data": {..} }` and drop the id, leaving form fields
fn entity_fields(value: Value) -> Result<Map<String, Value>, ApiError> {
    let mut fields = match value {
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Object(data)) => data,
            Some(other) => {
                obj.insert("data".to_string(), other);
                obj
            }
            None => obj,
        },
        other => {
            return Err(ApiError::decode(format!(
                "expected an entity object, got {}",
                other
            )))
        }
    };
    fields.remove("id");
    Ok(fields)
}

#[async_trait]
impl StepGateway for BackendClient {
    async fn save(
        &self,
        step_number: usize,
        payload: &StepPayload,
        is_editing: bool,
        entity_id: Option<&EntityId>,
    ) -> Result<EntityRef, GatewayError> {
        let request = match entity_id {
            Some(id) => self.client.put(self.update_url(id, step_number)),
            None => {
                if is_editing {
                    warn!(step = step_number, "editing without an entity id, creating instead");
                }
                self.client.post(self.create_url(step_number))
            }
        };

        let value = self.send(request.json(&payload.body)).await?;
        match entity_id {
            // Updates may answer with an empty body
            Some(id) if value.is_null() => Ok(EntityRef::new(id.clone())),
            _ => EntityRef::from_value(value),
        }
    }
}

#[async_trait]
impl HydrationSource for BackendClient {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Map<String, Value>, GatewayError> {
        let value = self.send(self.client.get(self.entity_url(entity_id))).await?;
        Ok(entity_fields(value)?)
    }
}

#[async_trait]
impl WorkflowSubmitter for BackendClient {
    async fn submit(&self, request: &WorkflowRequest) -> Result<(), GatewayError> {
        self.send(self.client.post(self.workflow_url()).json(request))
            .await?;
        Ok(())
    }
}

/// Validator backed by the server's step validation endpoint
#[derive(Debug, Clone)]
pub struct RemoteValidator {
    client: BackendClient,
}

#[async_trait]
impl Validator for RemoteValidator {
    async fn validate(
        &self,
        step_index: usize,
        _step: &StepDefinition,
        data: &Map<String, Value>,
    ) -> Result<ValidationOutcome, GatewayError> {
        // The wire contract numbers steps from 1
        let report = self.client.validate_step(step_index + 1, data).await?;
        Ok(report.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            timeout_ms: 1_000,
            token_env: "ESCROW_STEPPER_TEST_UNSET_TOKEN".to_string(),
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let client = BackendClient::new(&config("http://localhost:7010/"), "escrow-accounts").unwrap();
        let id = EntityId::new("42");
        assert_eq!(
            client.create_url(1),
            "http://localhost:7010/api/v1/escrow-accounts/steps/1"
        );
        assert_eq!(
            client.update_url(&id, 2),
            "http://localhost:7010/api/v1/escrow-accounts/42/steps/2"
        );
        assert_eq!(
            client.entity_url(&id),
            "http://localhost:7010/api/v1/escrow-accounts/42"
        );
        assert_eq!(
            client.validate_url(3),
            "http://localhost:7010/api/v1/escrow-accounts/steps/3/validate"
        );
        assert_eq!(
            client.workflow_url(),
            "http://localhost:7010/api/v1/workflow/requests"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(BackendClient::new(&config("not a url"), "fees").is_err());
    }

    #[test]
    fn test_token_override() {
        let client = BackendClient::new(&config("http://localhost:7010"), "fees").unwrap();
        assert!(!client.has_token());
        assert!(client.with_token(Some("abc".to_string())).has_token());
    }

    #[test]
    fn test_entity_fields_unwraps_data_and_drops_id() {
        let fields = entity_fields(json!({"data": {"id": "42", "name": "Acme"}})).unwrap();
        assert_eq!(fields, json!({"name": "Acme"}).as_object().cloned().unwrap());

        let fields = entity_fields(json!({"id": 7, "currency": "EUR"})).unwrap();
        assert_eq!(fields.get("currency"), Some(&json!("EUR")));
        assert!(!fields.contains_key("id"));

        assert!(entity_fields(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) is closed on test machines
        let client = BackendClient::new(&config("http://127.0.0.1:9"), "fees").unwrap();
        let err = client.fetch(&EntityId::new("1")).await.unwrap_err();
        assert!(!err.is_rejected());
    }
}
