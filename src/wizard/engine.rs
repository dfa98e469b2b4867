//! Stepper engine for multi-step entity wizards
//!
//! One engine drives one session. All operations take `&self`; the session
//! lives behind a mutex that is never held across an await, so a second
//! `save_and_advance` issued while the first is still waiting on the backend
//! observes `is_saving` and is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::form::FormState;
use super::gateway::{GatewayError, HydrationSource, StepGateway, WorkflowRequest, WorkflowSubmitter};
use super::navigator::Navigator;
use super::payload::build_payload;
use super::route::{Location, WizardRoute};
use super::types::*;
use super::validator::{IssueOrigin, ValidationOutcome, Validator};

/// Errors returned to the host for calls it should not have made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("flow has no steps")]
    EmptyFlow,
    #[error("step {target} is out of range (flow has {step_count} steps)")]
    StepOutOfRange { target: usize, step_count: usize },
    #[error("{mode} mode requires an entity id")]
    MissingEntityId { mode: WizardMode },
    #[error("already on the first step")]
    AtFirstStep,
    #[error("a save is in progress")]
    Busy,
    #[error("the wizard is read-only")]
    ReadOnly,
    #[error("step {target} has not been reached yet (furthest is {furthest})")]
    StepLocked { target: usize, furthest: usize },
    #[error("route collection '{found}' does not match flow collection '{expected}'")]
    CollectionMismatch { expected: String, found: String },
}

/// Backend and host collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub validator: Arc<dyn Validator>,
    pub gateway: Arc<dyn StepGateway>,
    pub hydration: Arc<dyn HydrationSource>,
    pub workflow: Arc<dyn WorkflowSubmitter>,
    pub navigator: Arc<dyn Navigator>,
}

/// Initial state of a session
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    pub mode: WizardMode,
    pub entity_id: Option<EntityId>,
    /// 0-based
    pub initial_step: usize,
    pub form: FormState,
}

impl SessionSeed {
    pub fn add() -> Self {
        Self::default()
    }

    pub fn edit(entity_id: impl Into<EntityId>) -> Self {
        Self {
            mode: WizardMode::Edit,
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn view(entity_id: impl Into<EntityId>) -> Self {
        Self {
            mode: WizardMode::View,
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn at_step(mut self, step_index: usize) -> Self {
        self.initial_step = step_index;
        self
    }

    pub fn with_form(mut self, form: FormState) -> Self {
        self.form = form;
        self
    }
}

/// Snapshot of what `save_and_advance` works on
struct StepPlan {
    index: usize,
    step: StepDefinition,
    mode: WizardMode,
    entity_id: Option<EntityId>,
    form: FormState,
}

fn lock(session: &Mutex<WizardSession>) -> MutexGuard<'_, WizardSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag on every exit path of `save_and_advance`
struct SavingGuard<'a> {
    session: &'a Mutex<WizardSession>,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut session = lock(self.session);
        session.is_saving = false;
        session.activity = Activity::Idle;
    }
}

pub struct StepperEngine {
    flow: WizardFlow,
    collaborators: Collaborators,
    context: EngineContext,
    settings: EngineSettings,
    session: Mutex<WizardSession>,
}

impl StepperEngine {
    pub fn new(
        flow: WizardFlow,
        seed: SessionSeed,
        collaborators: Collaborators,
        context: EngineContext,
        settings: EngineSettings,
    ) -> Result<Self, WizardError> {
        let step_count = flow.step_count();
        if step_count == 0 {
            return Err(WizardError::EmptyFlow);
        }
        if seed.initial_step >= step_count {
            return Err(WizardError::StepOutOfRange {
                target: seed.initial_step,
                step_count,
            });
        }

        let mode = match (seed.mode, &seed.entity_id) {
            (WizardMode::Edit | WizardMode::View, None) => {
                return Err(WizardError::MissingEntityId { mode: seed.mode });
            }
            // An add flow resumed after its entity was created continues as an edit
            (WizardMode::Add, Some(_)) => WizardMode::Edit,
            (mode, _) => mode,
        };

        let session = WizardSession {
            should_reset_form: seed.entity_id.is_some(),
            entity_id: seed.entity_id,
            current_step_index: seed.initial_step,
            furthest_step_index: seed.initial_step,
            mode,
            step_count,
            form_state: seed.form,
            is_saving: false,
            activity: Activity::Idle,
            last_error: None,
            last_success: None,
        };

        debug!(
            collection = %flow.collection,
            mode = %mode,
            step = session.step_number(),
            "wizard session started"
        );

        Ok(Self {
            flow,
            collaborators,
            context,
            settings,
            session: Mutex::new(session),
        })
    }

    /// Seed a session from a deep link
    pub fn from_route(
        flow: WizardFlow,
        route: &WizardRoute,
        collaborators: Collaborators,
        context: EngineContext,
        settings: EngineSettings,
    ) -> Result<Self, WizardError> {
        if route.collection != flow.collection {
            return Err(WizardError::CollectionMismatch {
                expected: flow.collection.clone(),
                found: route.collection.clone(),
            });
        }
        let seed = SessionSeed {
            mode: route.mode,
            entity_id: route.entity_id.clone(),
            initial_step: route.step_index(),
            form: FormState::new(),
        };
        Self::new(flow, seed, collaborators, context, settings)
    }

    fn lock(&self) -> MutexGuard<'_, WizardSession> {
        lock(&self.session)
    }

    pub fn flow(&self) -> &WizardFlow {
        &self.flow
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Copy of the current session state
    pub fn snapshot(&self) -> WizardSession {
        self.lock().clone()
    }

    pub fn current_step(&self) -> &StepDefinition {
        let index = self.lock().current_step_index;
        &self.flow.steps[index]
    }

    fn route_for(&self, session: &WizardSession) -> WizardRoute {
        WizardRoute::new(
            self.flow.collection.clone(),
            session.entity_id.clone(),
            session.current_step_index,
            session.mode,
        )
    }

    /// URL the host should currently display
    pub fn location(&self) -> Location {
        Location::Step(self.route_for(&self.lock()))
    }

    /// Record a user edit in the shared form
    pub fn set_field(&self, name: &str, value: Value) -> Result<(), WizardError> {
        let mut session = self.lock();
        if session.mode.is_read_only() {
            return Err(WizardError::ReadOnly);
        }
        session.form_state.set(name, value);
        Ok(())
    }

    pub fn dismiss_notices(&self) {
        let mut session = self.lock();
        session.last_error = None;
        session.last_success = None;
    }

    /// Drop notices older than the configured lifetime
    pub fn expire_notices(&self, now: DateTime<Utc>) {
        let ttl = self.settings.notice_ttl;
        let mut session = self.lock();
        if session
            .last_error
            .as_ref()
            .is_some_and(|n| n.is_expired(now, ttl))
        {
            session.last_error = None;
        }
        if session
            .last_success
            .as_ref()
            .is_some_and(|n| n.is_expired(now, ttl))
        {
            session.last_success = None;
        }
    }

    fn raise(&self, notice: Notice) {
        self.lock().last_error = Some(notice);
    }

    fn gateway_notice(&self, err: &GatewayError) -> Notice {
        let source = if err.is_rejected() {
            NoticeSource::Server
        } else {
            NoticeSource::Transport
        };
        Notice::error(source, err.banner(&self.settings.fallback_error))
    }

    fn missing_entity(step: &StepDefinition) -> Notice {
        Notice::error(
            NoticeSource::Contract,
            format!("Entity ID is required to proceed to {} step", step.label),
        )
    }

    fn set_activity(&self, activity: Activity) {
        self.lock().activity = activity;
    }

    /// Jump to `target` without validating (Back, or edit-from-review).
    ///
    /// Outside view mode only steps already reached may be entered; moving
    /// further forward goes through `save_and_advance`.
    pub async fn go_to_step(&self, target: usize) -> Result<HydrationOutcome, WizardError> {
        let location = {
            let mut session = self.lock();
            if target >= session.step_count {
                return Err(WizardError::StepOutOfRange {
                    target,
                    step_count: session.step_count,
                });
            }
            if !session.mode.is_read_only() && target > session.furthest_step_index {
                return Err(WizardError::StepLocked {
                    target,
                    furthest: session.furthest_step_index,
                });
            }
            if session.is_saving {
                return Err(WizardError::Busy);
            }
            session.last_error = None;
            session.last_success = None;
            session.current_step_index = target;
            Location::Step(self.route_for(&session))
        };
        self.collaborators.navigator.navigate(&location);
        debug!(step = target + 1, %location, "moved to step");

        Ok(self.hydrate().await)
    }

    /// Step back one, keeping in-progress edits
    pub fn go_back(&self) -> Result<(), WizardError> {
        let location = {
            let mut session = self.lock();
            if session.current_step_index == 0 {
                return Err(WizardError::AtFirstStep);
            }
            if session.is_saving {
                return Err(WizardError::Busy);
            }
            session.last_error = None;
            session.last_success = None;
            session.current_step_index -= 1;
            Location::Step(self.route_for(&session))
        };
        self.collaborators.navigator.navigate(&location);
        Ok(())
    }

    /// Load server data into the form if the entity changed since the last merge.
    ///
    /// Fields the user has edited in this session are never overwritten.
    pub async fn hydrate(&self) -> HydrationOutcome {
        let entity_id = {
            let session = self.lock();
            if !session.should_reset_form {
                return HydrationOutcome::Skipped;
            }
            match &session.entity_id {
                Some(id) => id.clone(),
                None => return HydrationOutcome::Skipped,
            }
        };

        match self.collaborators.hydration.fetch(&entity_id).await {
            Ok(data) => {
                let mut session = self.lock();
                if session.entity_id.as_ref() != Some(&entity_id) {
                    return HydrationOutcome::Skipped;
                }
                let fields = session.form_state.merge_server(&data);
                session.should_reset_form = false;
                debug!(entity_id = %entity_id, fields, "form hydrated");
                HydrationOutcome::Merged { fields }
            }
            Err(e) => {
                warn!(entity_id = %entity_id, "Failed to load entity: {}", e);
                self.raise(self.gateway_notice(&e));
                HydrationOutcome::Failed
            }
        }
    }

    /// Validate and persist the current step, then move on.
    ///
    /// Never fails: problems are reported through `last_error` and the
    /// session stays on the current step.
    pub async fn save_and_advance(&self) -> SubmitOutcome {
        let plan = {
            let mut session = self.lock();
            if session.is_saving {
                debug!("save already in flight, ignoring");
                return SubmitOutcome::Ignored;
            }
            session.is_saving = true;
            session.activity = Activity::Validating;
            session.last_error = None;
            session.last_success = None;
            let index = session.current_step_index;
            StepPlan {
                index,
                step: self.flow.steps[index].clone(),
                mode: session.mode,
                entity_id: session.entity_id.clone(),
                form: session.form_state.clone(),
            }
        };
        let _guard = SavingGuard {
            session: &self.session,
        };

        let persists = !plan.mode.is_read_only() && plan.step.kind == StepKind::Form;
        if persists {
            if let Err(notice) = self.persist(&plan).await {
                self.raise(notice);
                return SubmitOutcome::Blocked;
            }
        }

        self.advance(plan.index).await
    }

    async fn persist(&self, plan: &StepPlan) -> Result<(), Notice> {
        if !self.context.is_authenticated {
            return Err(Notice::error(NoticeSource::Transport, "Not authenticated"));
        }
        if plan.entity_id.is_none() && plan.index > 0 {
            return Err(Self::missing_entity(&plan.step));
        }

        if !plan.step.skip_validation {
            let data = plan.form.restrict(&plan.step.validated_fields());
            match self
                .collaborators
                .validator
                .validate(plan.index, &plan.step, &data)
                .await
            {
                Ok(ValidationOutcome::Valid) => {}
                Ok(outcome) => {
                    let source = match outcome.origin() {
                        Some(IssueOrigin::Server) => NoticeSource::Server,
                        _ => NoticeSource::Client,
                    };
                    let message = outcome.summary().unwrap_or_default();
                    debug!(step = plan.index + 1, ?source, %message, "step validation failed");
                    return Err(Notice::error(source, message));
                }
                Err(e) => return Err(self.gateway_notice(&e)),
            }
        }

        self.set_activity(Activity::Saving);
        let payload = build_payload(&plan.step, plan.index, &plan.form);
        let entity = self
            .collaborators
            .gateway
            .save(
                payload.step_number,
                &payload,
                plan.mode.is_editing(),
                plan.entity_id.as_ref(),
            )
            .await
            .map_err(|e| {
                warn!(step = payload.step_number, "Step save failed: {}", e);
                self.gateway_notice(&e)
            })?;

        let mut session = self.lock();
        match &session.entity_id {
            None => {
                info!(
                    collection = %self.flow.collection,
                    entity_id = %entity.id,
                    "entity created"
                );
                session.entity_id = Some(entity.id);
                if session.mode == WizardMode::Add {
                    session.mode = WizardMode::Edit;
                }
            }
            Some(existing) if *existing != entity.id => {
                warn!(
                    entity_id = %existing,
                    returned = %entity.id,
                    "backend returned a different entity id, keeping the original"
                );
            }
            Some(_) => {}
        }
        session.last_success = Some(Notice::success(format!("{} saved", plan.step.label)));
        Ok(())
    }

    async fn advance(&self, index: usize) -> SubmitOutcome {
        if index + 1 == self.flow.step_count() {
            return self.complete().await;
        }

        let next = index + 1;
        let location = {
            let mut session = self.lock();
            if !session.mode.is_read_only() && session.entity_id.is_none() {
                session.last_error = Some(Self::missing_entity(&self.flow.steps[next]));
                return SubmitOutcome::Blocked;
            }
            session.current_step_index = next;
            session.furthest_step_index = session.furthest_step_index.max(next);
            session.activity = Activity::Navigating;
            Location::Step(self.route_for(&session))
        };
        self.collaborators.navigator.navigate(&location);
        debug!(step = next + 1, %location, "advanced");

        self.hydrate().await;
        SubmitOutcome::Advanced { step: next }
    }

    async fn complete(&self) -> SubmitOutcome {
        let listing = Location::Listing {
            collection: self.flow.collection.clone(),
        };
        let (mode, entity_id, form) = {
            let session = self.lock();
            (
                session.mode,
                session.entity_id.clone(),
                session.form_state.clone(),
            )
        };

        if mode.is_read_only() {
            self.collaborators.navigator.navigate(&listing);
            return SubmitOutcome::Completed;
        }

        if !self.context.is_authenticated {
            self.raise(Notice::error(NoticeSource::Transport, "Not authenticated"));
            return SubmitOutcome::Blocked;
        }
        let Some(entity_id) = entity_id else {
            self.raise(Self::missing_entity(self.current_step()));
            return SubmitOutcome::Blocked;
        };

        let request = WorkflowRequest {
            reference_id: entity_id.clone(),
            reference_type: self.flow.completion.reference_type.clone(),
            module_name: self.flow.completion.module_name.clone(),
            action_key: self.flow.completion.action_key.clone(),
            payload_json: Value::Object(form.values().clone()).to_string(),
        };

        self.set_activity(Activity::Saving);
        if let Err(e) = self.collaborators.workflow.submit(&request).await {
            warn!(entity_id = %entity_id, "Workflow submission failed: {}", e);
            self.raise(self.gateway_notice(&e));
            return SubmitOutcome::Blocked;
        }
        info!(
            collection = %self.flow.collection,
            entity_id = %entity_id,
            action = %request.action_key,
            "submitted for approval"
        );

        {
            let mut session = self.lock();
            session.last_success = Some(Notice::success("Submitted for approval"));
            session.activity = Activity::Navigating;
        }
        self.collaborators.navigator.navigate(&listing);
        SubmitOutcome::Completed
    }
}
