//! Type definitions for the step wizard

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::form::FormState;
use super::payload::FieldTransform;

/// How the wizard was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardMode {
    /// Fresh entry; the entity does not exist yet
    #[default]
    Add,
    /// Editing an existing entity
    Edit,
    /// Read-only traversal of an existing entity
    View,
}

impl WizardMode {
    /// Query flag carried in the URL for this mode
    pub fn query_flag(&self) -> Option<(&'static str, &'static str)> {
        match self {
            WizardMode::Add => None,
            WizardMode::Edit => Some(("editing", "true")),
            WizardMode::View => Some(("mode", "view")),
        }
    }

    /// Value of the `isEditing` flag passed to the persistence gateway
    pub fn is_editing(&self) -> bool {
        matches!(self, WizardMode::Edit)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, WizardMode::View)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardMode::Add => "add",
            WizardMode::Edit => "edit",
            WizardMode::View => "view",
        }
    }
}

impl fmt::Display for WizardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business meaning of a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Data-entry step that is validated and persisted
    #[default]
    Form,
    /// Document upload; persists through its own side channel and never blocks
    OptionalUpload,
    /// Read-only summary whose completion submits the flow
    Review,
}

/// Validation rules for a single field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Regular expression the textual value must match
    #[serde(default)]
    pub pattern: Option<String>,
    /// Allowed values for select fields
    #[serde(default)]
    pub one_of: Vec<String>,
    /// Value must parse as a calendar date
    #[serde(default)]
    pub date: bool,
    /// Value must be numeric
    #[serde(default)]
    pub number: bool,
}

/// A field collected by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rules: FieldRules,
    /// How the value is projected into the step payload
    #[serde(default)]
    pub transform: FieldTransform,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            rules: FieldRules::default(),
            transform: FieldTransform::None,
        }
    }

    pub fn required(mut self) -> Self {
        self.rules.required = true;
        self
    }

    pub fn with_transform(mut self, transform: FieldTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Static descriptor of one wizard step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub label: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Persist without running the validator
    #[serde(default)]
    pub skip_validation: bool,
    /// Fields with their own cross-field rules, left out of validation
    #[serde(default)]
    pub excluded_fields: Vec<String>,
}

impl StepDefinition {
    pub fn form(label: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            label: label.into(),
            kind: StepKind::Form,
            fields,
            skip_validation: false,
            excluded_fields: Vec::new(),
        }
    }

    pub fn optional_upload(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: StepKind::OptionalUpload,
            fields: Vec::new(),
            skip_validation: true,
            excluded_fields: Vec::new(),
        }
    }

    pub fn review(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: StepKind::Review,
            fields: Vec::new(),
            skip_validation: true,
            excluded_fields: Vec::new(),
        }
    }

    /// Optional steps never block advancement and are never validated
    pub fn is_optional(&self) -> bool {
        self.kind == StepKind::OptionalUpload
    }

    /// Names of the fields this step validates
    pub fn validated_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| !self.excluded_fields.iter().any(|e| e == name))
            .collect()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Identifiers for the downstream approval request fired on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSpec {
    pub reference_type: String,
    pub module_name: String,
    pub action_key: String,
}

/// Everything the engine needs to know about one entity's wizard
#[derive(Debug, Clone, PartialEq)]
pub struct WizardFlow {
    /// Route collection segment (e.g., "escrow-accounts")
    pub collection: String,
    pub steps: Vec<StepDefinition>,
    pub completion: CompletionSpec,
}

impl WizardFlow {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Server-assigned identifier of the entity being created or edited
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What the engine is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    Idle,
    Validating,
    Saving,
    Navigating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Error,
    Success,
}

/// Where a notice came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSource {
    /// Client-side validation rules
    Client,
    /// Server rejected the payload
    Server,
    /// Network or transport failure
    Transport,
    /// Engine contract violation (e.g., missing entity id)
    Contract,
    /// Informational message from the engine
    Engine,
}

/// Transient banner message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub source: NoticeSource,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn error(source: NoticeSource, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            source,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            source: NoticeSource::Engine,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    /// Whether the notice has outlived `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.raised_at);
        age.to_std().map(|age| age >= ttl).unwrap_or(false)
    }
}

/// Run-time state of one in-progress wizard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardSession {
    pub entity_id: Option<EntityId>,
    pub current_step_index: usize,
    /// Highest step entered through a save, or the step the session opened on
    pub furthest_step_index: usize,
    pub mode: WizardMode,
    pub step_count: usize,
    pub form_state: FormState,
    pub is_saving: bool,
    pub activity: Activity,
    /// Armed when the entity changes; cleared once server data has been merged
    pub should_reset_form: bool,
    pub last_error: Option<Notice>,
    pub last_success: Option<Notice>,
}

impl WizardSession {
    pub fn is_last_step(&self) -> bool {
        self.current_step_index + 1 == self.step_count
    }

    /// 1-based step number shown in the URL
    pub fn step_number(&self) -> usize {
        self.current_step_index + 1
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|n| n.message.as_str())
    }

    pub fn success_message(&self) -> Option<&str> {
        self.last_success.as_ref().map(|n| n.message.as_str())
    }
}

/// Read-only ambient context injected by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContext {
    pub locale: String,
    pub is_authenticated: bool,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            is_authenticated: true,
        }
    }
}

/// Tunables taken from the `[wizard]` config section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub notice_ttl: Duration,
    pub fallback_error: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&crate::config::WizardConfig::default())
    }
}

impl From<&crate::config::WizardConfig> for EngineSettings {
    fn from(config: &crate::config::WizardConfig) -> Self {
        Self {
            notice_ttl: Duration::from_millis(config.notice_ttl_ms),
            fallback_error: config.fallback_error.clone(),
        }
    }
}

/// Result of a `save_and_advance` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A save was already in flight; the call was dropped
    Ignored,
    /// Validation, persistence or a contract check failed; the step did not change
    Blocked,
    /// Moved to the given 0-based step
    Advanced { step: usize },
    /// Final step finished and the host was sent back to the listing
    Completed,
}

/// Result of a hydration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Nothing to load (add mode, or form already hydrated)
    Skipped,
    /// Server data merged; `fields` values were written
    Merged { fields: usize },
    /// The fetch failed; the error notice is set
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_query_flags() {
        assert_eq!(WizardMode::Add.query_flag(), None);
        assert_eq!(WizardMode::Edit.query_flag(), Some(("editing", "true")));
        assert_eq!(WizardMode::View.query_flag(), Some(("mode", "view")));
    }

    #[test]
    fn test_only_upload_steps_are_optional() {
        assert!(StepDefinition::optional_upload("Documents").is_optional());
        assert!(!StepDefinition::review("Review").is_optional());
        assert!(!StepDefinition::form("Details", vec![]).is_optional());
    }

    #[test]
    fn test_validated_fields_skip_exclusions() {
        let mut step = StepDefinition::form(
            "Details",
            vec![
                FieldSpec::new("name"),
                FieldSpec::new("start_date"),
                FieldSpec::new("end_date"),
            ],
        );
        step.excluded_fields = vec!["start_date".to_string(), "end_date".to_string()];
        assert_eq!(step.validated_fields(), vec!["name"]);
        assert_eq!(step.field_names().len(), 3);
    }

    #[test]
    fn test_notice_expiry() {
        let notice = Notice::error(NoticeSource::Client, "bad");
        let ttl = Duration::from_secs(5);
        assert!(!notice.is_expired(notice.raised_at, ttl));
        assert!(!notice.is_expired(notice.raised_at + chrono::Duration::seconds(4), ttl));
        assert!(notice.is_expired(notice.raised_at + chrono::Duration::seconds(5), ttl));
    }

    #[test]
    fn test_step_definition_deserializes_with_defaults() {
        let step: StepDefinition = serde_json::from_str(r#"{"label": "Documents", "kind": "optional_upload"}"#).unwrap();
        assert!(step.is_optional());
        assert!(step.fields.is_empty());
        assert!(!step.skip_validation);
    }
}
