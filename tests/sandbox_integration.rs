//! Integration tests driving the wizard engine against the sandbox backend
//!
//! Every test starts its own sandbox on an ephemeral loopback port and talks
//! to it over real HTTP through `BackendClient`, so the wire contract between
//! engine, client and server is exercised end to end.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use escrow_stepper::api::BackendClient;
use escrow_stepper::config::BackendConfig;
use escrow_stepper::flows::FlowRegistry;
use escrow_stepper::rest::{ApiState, SandboxServer};
use escrow_stepper::runner::{run_to_completion, AnswerSheet};
use escrow_stepper::wizard::{
    Collaborators, EngineContext, EngineSettings, GatewayError, HistoryNavigator,
    HydrationOutcome, Location, RuleValidator, SessionSeed, StepDefinition, StepperEngine,
    SubmitOutcome, ValidationOutcome, Validator,
};

// ─── Test Context ─────────────────────────────────────────────────────────────

struct Sandbox {
    server: SandboxServer,
    state: ApiState,
    flows: FlowRegistry,
}

impl Sandbox {
    async fn start() -> Self {
        let mut flows = FlowRegistry::new();
        flows.load_builtins().expect("builtin flows load");
        let state = ApiState::new(flows.clone());
        let server = SandboxServer::spawn_local(state.clone())
            .await
            .expect("sandbox starts");
        Self {
            server,
            state,
            flows,
        }
    }

    fn client(&self, collection: &str) -> BackendClient {
        let config = BackendConfig {
            base_url: self.server.base_url(),
            timeout_ms: 5_000,
            token_env: "ESCROW_STEPPER_TEST_UNSET_TOKEN".to_string(),
        };
        BackendClient::new(&config, collection).expect("client builds")
    }

    fn engine(
        &self,
        flow_key: &str,
        seed: SessionSeed,
        validator: Arc<dyn Validator>,
    ) -> (StepperEngine, Arc<HistoryNavigator>) {
        let definition = self.flows.get(flow_key).expect("flow exists");
        let client = Arc::new(self.client(&definition.collection));
        let navigator = Arc::new(HistoryNavigator::new());
        let collaborators = Collaborators {
            validator,
            gateway: client.clone(),
            hydration: client.clone(),
            workflow: client,
            navigator: navigator.clone(),
        };
        let engine = StepperEngine::new(
            definition.to_flow(),
            seed,
            collaborators,
            EngineContext::default(),
            EngineSettings::default(),
        )
        .expect("engine builds");
        (engine, navigator)
    }
}

/// Lets everything through so the server's own checks are reached
struct AcceptAll;

#[async_trait]
impl Validator for AcceptAll {
    async fn validate(
        &self,
        _step_index: usize,
        _step: &StepDefinition,
        _data: &Map<String, Value>,
    ) -> Result<ValidationOutcome, GatewayError> {
        Ok(ValidationOutcome::from_issues(Vec::new()))
    }
}

fn answers(steps: Value) -> AnswerSheet {
    let steps: BTreeMap<String, Map<String, Value>> =
        serde_json::from_value(steps).expect("answer sheet");
    AnswerSheet::from_map(steps)
}

fn fill(engine: &StepperEngine, values: Value) {
    for (name, value) in values.as_object().expect("object") {
        engine.set_field(name, value.clone()).expect("field set");
    }
}

fn fee_details() -> Value {
    json!({
        "name": "  Setup fee ",
        "fee_type": "FIXED",
        "amount": 250,
        "currency": "EUR"
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_party_flow_runs_to_completion() {
    let sandbox = Sandbox::start().await;
    let (engine, navigator) = sandbox.engine(
        "party",
        SessionSeed::add(),
        Arc::new(RuleValidator::new()),
    );

    let sheet = answers(json!({
        "Details": {
            "name": "Northwind Holdings",
            "party_type": "CORPORATE",
            "country": "DE"
        }
    }));
    let report = run_to_completion(&engine, &sheet).await.expect("flow completes");

    assert_eq!(report.visited, vec!["Details", "Documents", "Review"]);
    assert_eq!(report.final_location, "/parties");
    let id = report.entity_id.expect("entity created");

    let store = sandbox.state.store.read().await;
    let stored = store.get("parties", id.as_str()).expect("entity stored");
    assert_eq!(stored.fields["name"], json!("Northwind Holdings"));
    assert_eq!(stored.fields["country"], json!("DE"));

    let requests = store.workflow_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request.reference_id, id);
    assert_eq!(requests[0].request.action_key, "CREATE_PARTY");
    drop(store);

    // Creation switched the session into edit mode
    let history = navigator.history();
    assert_eq!(
        history[0].to_string(),
        format!("/parties/{}/step/2?editing=true", id)
    );
    assert_eq!(
        history.last(),
        Some(&Location::Listing {
            collection: "parties".to_string()
        })
    );

    sandbox.server.shutdown().await;
}

#[tokio::test]
async fn test_local_validation_blocks_before_any_request() {
    let sandbox = Sandbox::start().await;
    let (engine, _) = sandbox.engine("fee", SessionSeed::add(), Arc::new(RuleValidator::new()));

    fill(&engine, json!({"name": "Setup fee", "fee_type": "FIXED", "amount": 10}));
    assert_eq!(engine.save_and_advance().await, SubmitOutcome::Blocked);

    let session = engine.snapshot();
    assert_eq!(session.current_step_index, 0);
    assert!(session.error_message().unwrap().contains("currency"));
    assert_eq!(sandbox.state.store.read().await.entity_count(), 0);
}

#[tokio::test]
async fn test_server_rejection_surfaces_server_message() {
    let sandbox = Sandbox::start().await;
    let (engine, _) = sandbox.engine("fee", SessionSeed::add(), Arc::new(AcceptAll));

    fill(
        &engine,
        json!({"name": "Setup fee", "fee_type": "FIXED", "amount": "ten", "currency": "EUR"}),
    );
    assert_eq!(engine.save_and_advance().await, SubmitOutcome::Blocked);

    let session = engine.snapshot();
    assert_eq!(
        session.error_message(),
        Some("Validation failed: amount: must be a number")
    );
    assert!(session.entity_id.is_none());
    assert!(!session.is_saving);

    // Fix the field and retry on the same session
    engine.set_field("amount", json!(10)).unwrap();
    assert_eq!(
        engine.save_and_advance().await,
        SubmitOutcome::Advanced { step: 1 }
    );
    assert!(engine.snapshot().entity_id.is_some());
}

#[tokio::test]
async fn test_edit_session_hydrates_and_updates_in_place() {
    let sandbox = Sandbox::start().await;

    let (engine, _) = sandbox.engine("fee", SessionSeed::add(), Arc::new(RuleValidator::new()));
    fill(&engine, fee_details());
    assert_eq!(
        engine.save_and_advance().await,
        SubmitOutcome::Advanced { step: 1 }
    );
    let id = engine.snapshot().entity_id.expect("entity created");

    let (editor, _) = sandbox.engine(
        "fee",
        SessionSeed::edit(id.clone()),
        Arc::new(RuleValidator::new()),
    );
    assert!(matches!(
        editor.hydrate().await,
        HydrationOutcome::Merged { .. }
    ));
    let session = editor.snapshot();
    // Trimmed on the way in
    assert_eq!(session.form_state.get("name"), Some(&json!("Setup fee")));
    assert_eq!(session.form_state.get("currency"), Some(&json!("EUR")));

    // Hydrating again without navigation does not refetch
    assert_eq!(editor.hydrate().await, HydrationOutcome::Skipped);

    editor.set_field("amount", json!(300)).unwrap();
    assert_eq!(
        editor.save_and_advance().await,
        SubmitOutcome::Advanced { step: 1 }
    );
    assert_eq!(editor.snapshot().entity_id, Some(id.clone()));

    let store = sandbox.state.store.read().await;
    assert_eq!(store.entity_count(), 1);
    assert_eq!(
        store.get("fees", id.as_str()).unwrap().fields["amount"],
        json!(300)
    );
}

#[tokio::test]
async fn test_hydration_of_missing_entity_reports_server_message() {
    let sandbox = Sandbox::start().await;
    let (engine, _) = sandbox.engine(
        "fee",
        SessionSeed::view("does-not-exist"),
        Arc::new(RuleValidator::new()),
    );

    assert_eq!(engine.hydrate().await, HydrationOutcome::Failed);
    assert_eq!(
        engine.snapshot().error_message(),
        Some("Entity 'does-not-exist' not found in fees")
    );
}

#[tokio::test]
async fn test_duplicate_workflow_submission_is_rejected() {
    let sandbox = Sandbox::start().await;
    let (engine, _) = sandbox.engine("fee", SessionSeed::add(), Arc::new(RuleValidator::new()));
    fill(&engine, fee_details());
    assert_eq!(
        engine.save_and_advance().await,
        SubmitOutcome::Advanced { step: 1 }
    );
    assert_eq!(engine.save_and_advance().await, SubmitOutcome::Completed);
    let id = engine.snapshot().entity_id.unwrap();

    // A second session over the same entity tries to submit again
    let (again, _) = sandbox.engine(
        "fee",
        SessionSeed::edit(id).at_step(1),
        Arc::new(RuleValidator::new()),
    );
    assert_eq!(again.save_and_advance().await, SubmitOutcome::Blocked);
    assert!(again.snapshot().error_message().is_some());
    assert_eq!(sandbox.state.store.read().await.workflow_requests().len(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_shows_fallback_banner() {
    let sandbox = Sandbox::start().await;
    let (engine, _) = sandbox.engine("fee", SessionSeed::add(), Arc::new(RuleValidator::new()));
    fill(&engine, fee_details());

    sandbox.server.shutdown().await;

    assert_eq!(engine.save_and_advance().await, SubmitOutcome::Blocked);
    let session = engine.snapshot();
    assert_eq!(
        session.error_message(),
        Some(EngineSettings::default().fallback_error.as_str())
    );
    assert_eq!(session.current_step_index, 0);
}
