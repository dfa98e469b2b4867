//! Multi-step entity wizard: navigation, validation gating and per-step persistence

pub mod engine;
pub mod form;
pub mod gateway;
pub mod navigator;
pub mod payload;
pub mod route;
pub mod types;
pub mod validator;

pub use engine::{Collaborators, SessionSeed, StepperEngine, WizardError};
pub use form::FormState;
pub use gateway::{
    EntityRef, GatewayError, HydrationSource, StepGateway, WorkflowRequest, WorkflowSubmitter,
};
pub use navigator::{HistoryNavigator, Navigator};
pub use payload::{build_payload, FieldTransform, StepPayload};
pub use route::{Location, RouteError, WizardRoute};
pub use types::*;
pub use validator::{
    CompositeValidator, FieldIssue, IssueOrigin, RuleValidator, ValidationOutcome,
    ValidationReport, Validator,
};
