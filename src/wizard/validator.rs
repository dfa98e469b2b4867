//! Step validation
//!
//! Validators receive the 0-based step index and only the fields of that step.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::gateway::GatewayError;
use super::payload::{parse_date, FieldTransform};
use super::types::{FieldSpec, StepDefinition};

/// A single field-level failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: vec![field.into()],
            message: message.into(),
        }
    }

    pub fn path_display(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path_display(), self.message)
        }
    }
}

/// Side of the wire that found the issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IssueOrigin {
    #[default]
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid {
        issues: Vec<FieldIssue>,
        origin: IssueOrigin,
    },
}

impl ValidationOutcome {
    /// Client-side outcome from a list of issues
    pub fn from_issues(issues: Vec<FieldIssue>) -> Self {
        Self::from_issues_at(issues, IssueOrigin::Client)
    }

    pub fn from_issues_at(issues: Vec<FieldIssue>, origin: IssueOrigin) -> Self {
        if issues.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid { issues, origin }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            ValidationOutcome::Valid => &[],
            ValidationOutcome::Invalid { issues, .. } => issues,
        }
    }

    /// `None` when valid
    pub fn origin(&self) -> Option<IssueOrigin> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid { origin, .. } => Some(*origin),
        }
    }

    /// Banner text concatenating every field message
    pub fn summary(&self) -> Option<String> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid { issues, .. } => {
                let parts: Vec<String> = issues.iter().map(ToString::to_string).collect();
                Some(format!("Validation failed: {}", parts.join("; ")))
            }
        }
    }
}

// Wire format: { success, errors: { issues: [{ path, message }] } }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(u64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireIssue {
    #[serde(default)]
    pub path: Vec<PathSegment>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireErrors {
    #[serde(default)]
    pub issues: Vec<WireIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<WireErrors>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: None,
        }
    }
}

impl From<ValidationReport> for ValidationOutcome {
    fn from(report: ValidationReport) -> Self {
        if report.success {
            return ValidationOutcome::Valid;
        }
        let mut issues: Vec<FieldIssue> = report
            .errors
            .unwrap_or_default()
            .issues
            .into_iter()
            .map(|issue| FieldIssue {
                path: issue.path.iter().map(ToString::to_string).collect(),
                message: issue.message,
            })
            .collect();
        if issues.is_empty() {
            issues.push(FieldIssue {
                path: Vec::new(),
                message: "invalid".to_string(),
            });
        }
        ValidationOutcome::Invalid {
            issues,
            origin: IssueOrigin::Server,
        }
    }
}

impl From<&ValidationOutcome> for ValidationReport {
    fn from(outcome: &ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Valid => ValidationReport::ok(),
            ValidationOutcome::Invalid { issues, .. } => ValidationReport {
                success: false,
                errors: Some(WireErrors {
                    issues: issues
                        .iter()
                        .map(|issue| WireIssue {
                            path: issue.path.iter().cloned().map(PathSegment::Key).collect(),
                            message: issue.message.clone(),
                        })
                        .collect(),
                }),
            },
        }
    }
}

/// Validates the data of one step
#[async_trait]
pub trait Validator: Send + Sync {
    /// `data` holds only the fields of `step`. `Err` means the check could
    /// not run (e.g., the server round trip failed), not that data is invalid.
    async fn validate(
        &self,
        step_index: usize,
        step: &StepDefinition,
        data: &Map<String, Value>,
    ) -> Result<ValidationOutcome, GatewayError>;
}

/// Client-side rules declared on each field
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn check_field(field: &FieldSpec, value: Option<&Value>, issues: &mut Vec<FieldIssue>) {
    let rules = &field.rules;
    if is_empty_value(value) {
        if rules.required {
            issues.push(FieldIssue::new(&field.name, "required"));
        }
        return;
    }
    let Some(value) = value else { return };
    let text = as_text(value);

    if let Some(text) = &text {
        let len = text.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                issues.push(FieldIssue::new(
                    &field.name,
                    format!("must be at least {} characters", min),
                ));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                issues.push(FieldIssue::new(
                    &field.name,
                    format!("must be at most {} characters", max),
                ));
            }
        }
        if let Some(pattern) = &rules.pattern {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(text) => {
                    issues.push(FieldIssue::new(&field.name, "has an invalid format"));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(field = %field.name, "Invalid validation pattern: {}", e);
                    issues.push(FieldIssue::new(&field.name, "has an invalid format"));
                }
            }
        }
        if !rules.one_of.is_empty() && !rules.one_of.iter().any(|o| o == text) {
            issues.push(FieldIssue::new(
                &field.name,
                format!("must be one of: {}", rules.one_of.join(", ")),
            ));
        }
    }

    if field.transform == FieldTransform::Reference {
        if let Value::Object(obj) = value {
            if !obj.contains_key("id") {
                issues.push(FieldIssue::new(&field.name, "must reference a record"));
            }
        }
    }

    if rules.date {
        let valid = match value {
            Value::String(s) => parse_date(s).is_some(),
            _ => false,
        };
        if !valid {
            issues.push(FieldIssue::new(&field.name, "must be a valid date"));
        }
    }

    if rules.number {
        let valid = match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        };
        if !valid {
            issues.push(FieldIssue::new(&field.name, "must be a number"));
        }
    }
}

impl RuleValidator {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`Validator::validate`]
    pub fn validate_sync(&self, step: &StepDefinition, data: &Map<String, Value>) -> ValidationOutcome {
        let mut issues = Vec::new();
        for field in &step.fields {
            if step.excluded_fields.iter().any(|e| e == &field.name) {
                continue;
            }
            check_field(field, data.get(&field.name), &mut issues);
        }
        ValidationOutcome::from_issues(issues)
    }
}

#[async_trait]
impl Validator for RuleValidator {
    async fn validate(
        &self,
        _step_index: usize,
        step: &StepDefinition,
        data: &Map<String, Value>,
    ) -> Result<ValidationOutcome, GatewayError> {
        Ok(self.validate_sync(step, data))
    }
}

/// Runs local rules first, then the remote check only when they pass
pub struct CompositeValidator {
    local: Arc<dyn Validator>,
    remote: Arc<dyn Validator>,
}

impl CompositeValidator {
    pub fn new(local: Arc<dyn Validator>, remote: Arc<dyn Validator>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl Validator for CompositeValidator {
    async fn validate(
        &self,
        step_index: usize,
        step: &StepDefinition,
        data: &Map<String, Value>,
    ) -> Result<ValidationOutcome, GatewayError> {
        let local = self.local.validate(step_index, step, data).await?;
        if !local.is_valid() {
            return Ok(local);
        }
        self.remote.validate(step_index, step, data).await
    }
}
