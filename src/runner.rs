//! Non-interactive driver for a wizard session
//!
//! Feeds prepared answers into an engine step by step, the way a user would
//! fill each screen and press Next, and stops at the first blocking error.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::flows::FlowDefinition;
use crate::wizard::{EntityId, Location, StepDefinition, StepperEngine, SubmitOutcome};

/// Field values per step, keyed by step label or 1-based step number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerSheet {
    steps: BTreeMap<String, Map<String, Value>>,
}

impl AnswerSheet {
    pub fn from_map(steps: BTreeMap<String, Map<String, Value>>) -> Self {
        Self { steps }
    }

    /// Read a JSON or YAML answer file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers: {}", path.display()))?;
        let is_json = path.extension().is_some_and(|e| e == "json");
        let steps = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML: {}", path.display()))?
        };
        Ok(Self { steps })
    }

    /// Fail on keys that name no step of `flow`
    pub fn check_against(&self, flow: &FlowDefinition) -> Result<()> {
        let unknown: Vec<&str> = self
            .steps
            .keys()
            .filter(|key| {
                flow.step_index(key).is_none()
                    && !key
                        .parse::<usize>()
                        .is_ok_and(|n| (1..=flow.steps.len()).contains(&n))
            })
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            bail!(
                "Answers name steps not in flow '{}': {}",
                flow.key,
                unknown.join(", ")
            );
        }
        Ok(())
    }

    /// Answers for `step`, matched by label first, then by number
    pub fn for_step(&self, step_index: usize, step: &StepDefinition) -> Option<&Map<String, Value>> {
        self.steps
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(&step.label))
            .map(|(_, answers)| answers)
            .or_else(|| self.steps.get(&(step_index + 1).to_string()))
    }
}

/// What a completed run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub entity_id: Option<EntityId>,
    /// Labels of the steps passed, in order
    pub visited: Vec<String>,
    pub final_location: String,
}

/// Drive `engine` from its current step to completion
pub async fn run_to_completion(engine: &StepperEngine, answers: &AnswerSheet) -> Result<RunReport> {
    engine.hydrate().await;

    let mut visited = Vec::new();
    // Each call either advances or completes; anything more means a loop
    let max_rounds = engine.flow().step_count() + 1;

    for _ in 0..max_rounds {
        let session = engine.snapshot();
        let index = session.current_step_index;
        let step = engine.current_step().clone();

        if !session.mode.is_read_only() {
            if let Some(values) = answers.for_step(index, &step) {
                for (name, value) in values {
                    engine.set_field(name, value.clone())?;
                }
                debug!(step = index + 1, fields = values.len(), "answers applied");
            }
        }

        let outcome = engine.save_and_advance().await;
        visited.push(step.label.clone());

        match outcome {
            SubmitOutcome::Advanced { step: next } => {
                info!("{} done, now at step {}", step.label, next + 1);
            }
            SubmitOutcome::Completed => {
                let session = engine.snapshot();
                return Ok(RunReport {
                    entity_id: session.entity_id,
                    visited,
                    final_location: Location::Listing {
                        collection: engine.flow().collection.clone(),
                    }
                    .to_string(),
                });
            }
            SubmitOutcome::Blocked => {
                let message = engine
                    .snapshot()
                    .error_message()
                    .unwrap_or("step was not saved")
                    .to_string();
                bail!("Step {} ({}) blocked: {}", index + 1, step.label, message);
            }
            SubmitOutcome::Ignored => bail!("A save was already in progress"),
        }
    }

    bail!("Flow did not complete after {} steps", max_rounds)
}
