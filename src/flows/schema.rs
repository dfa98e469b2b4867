//! Flow definition schema

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wizard::{CompletionSpec, StepDefinition, StepKind, WizardFlow};

/// Where a flow definition was loaded from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowSource {
    #[default]
    Builtin,
    User,
}

/// Declarative description of one entity's wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Unique key (e.g., "escrow_account")
    pub key: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Route and API collection segment
    pub collection: String,
    /// Workflow request identifiers sent on completion
    pub reference_type: String,
    pub module_name: String,
    pub action_key: String,
    pub steps: Vec<StepDefinition>,
    #[serde(skip)]
    pub source: FlowSource,
}

/// Problems found in a flow definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("flow key must not be empty")]
    EmptyKey,
    #[error("collection '{0}' must be a non-empty path without a leading or trailing '/'")]
    InvalidCollection(String),
    #[error("flow must have at least one step")]
    NoSteps,
    #[error("step '{step}' declares field '{field}' more than once")]
    DuplicateField { step: String, field: String },
    #[error("review step '{0}' must be the last step")]
    ReviewNotLast(String),
    #[error("flow has more than one review step")]
    MultipleReviews,
    #[error("field '{field}' has an invalid pattern: {reason}")]
    InvalidPattern { field: String, reason: String },
    #[error("step '{step}' excludes unknown field '{field}'")]
    UnknownExclusion { step: String, field: String },
}

impl FlowDefinition {
    /// Validate the definition for consistency
    pub fn validate(&self) -> Result<(), Vec<FlowError>> {
        let mut errors = Vec::new();

        if self.key.trim().is_empty() {
            errors.push(FlowError::EmptyKey);
        }

        if self.collection.is_empty()
            || self.collection.starts_with('/')
            || self.collection.ends_with('/')
            || self.collection.contains("//")
        {
            errors.push(FlowError::InvalidCollection(self.collection.clone()));
        }

        if self.steps.is_empty() {
            errors.push(FlowError::NoSteps);
        }

        let last = self.steps.len().saturating_sub(1);
        let mut reviews = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if step.kind == StepKind::Review {
                reviews += 1;
                if index != last {
                    errors.push(FlowError::ReviewNotLast(step.label.clone()));
                }
            }

            let mut seen = HashSet::new();
            for field in &step.fields {
                if !seen.insert(field.name.as_str()) {
                    errors.push(FlowError::DuplicateField {
                        step: step.label.clone(),
                        field: field.name.clone(),
                    });
                }
                if let Some(pattern) = &field.rules.pattern {
                    if let Err(e) = Regex::new(pattern) {
                        errors.push(FlowError::InvalidPattern {
                            field: field.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            for excluded in &step.excluded_fields {
                if !seen.contains(excluded.as_str()) {
                    errors.push(FlowError::UnknownExclusion {
                        step: step.label.clone(),
                        field: excluded.clone(),
                    });
                }
            }
        }
        if reviews > 1 {
            errors.push(FlowError::MultipleReviews);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn completion(&self) -> CompletionSpec {
        CompletionSpec {
            reference_type: self.reference_type.clone(),
            module_name: self.module_name.clone(),
            action_key: self.action_key.clone(),
        }
    }

    /// Engine-facing view of this definition
    pub fn to_flow(&self) -> WizardFlow {
        WizardFlow {
            collection: self.collection.clone(),
            steps: self.steps.clone(),
            completion: self.completion(),
        }
    }

    /// Find a step by its label, case-insensitively
    pub fn step_index(&self, label: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.label.eq_ignore_ascii_case(label))
    }

    pub fn field_count(&self) -> usize {
        self.steps.iter().map(|s| s.fields.len()).sum()
    }
}
