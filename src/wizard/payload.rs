//! Per-step persistence payloads
//!
//! Each step declares how its fields are projected out of the shared form
//! record. The projection is a pure function so the same form always yields
//! the same payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::form::FormState;
use super::types::{StepDefinition, StepKind};

/// Canonical date representation sent to the backend
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepted input date layouts besides RFC 3339
const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// How a form value is shaped before it is persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldTransform {
    /// Sent as entered
    #[default]
    None,
    /// Surrounding whitespace removed from strings
    Trim,
    /// Normalized to `YYYY-MM-DD`
    Date,
    /// Coerced to an `{ "id": ... }` reference
    Reference,
    /// Server-managed flag; filled with `value` when the form has none
    #[serde(rename = "default")]
    DefaultValue { value: Value },
}

/// Payload for one step's save call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPayload {
    /// 1-based step number
    pub step_number: usize,
    pub kind: StepKind,
    pub body: Map<String, Value>,
}

/// Parse the date layouts the console's pickers produce
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }

    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn project_value(transform: &FieldTransform, value: Option<&Value>) -> Option<Value> {
    match transform {
        FieldTransform::None => value.cloned(),
        FieldTransform::Trim => value.map(|v| match v {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        }),
        FieldTransform::Date => {
            let value = value.filter(|v| !is_blank(v))?;
            match value {
                Value::String(s) => Some(
                    parse_date(s)
                        .map(|d| Value::String(d.format(CANONICAL_DATE_FORMAT).to_string()))
                        .unwrap_or_else(|| value.clone()),
                ),
                other => Some(other.clone()),
            }
        }
        FieldTransform::Reference => {
            let value = value.filter(|v| !is_blank(v))?;
            let id = match value {
                Value::Object(obj) => match obj.get("id") {
                    Some(id) => id.clone(),
                    // Sent as is so the server reports it
                    None => return Some(value.clone()),
                },
                scalar => scalar.clone(),
            };
            let mut reference = Map::new();
            reference.insert("id".to_string(), id);
            Some(Value::Object(reference))
        }
        FieldTransform::DefaultValue { value: default } => match value {
            Some(v) if !is_blank(v) => Some(v.clone()),
            _ => Some(default.clone()),
        },
    }
}

/// Build the save payload for `step` from the shared form record.
///
/// Fields missing from the form are omitted rather than sent as null,
/// except server-managed defaults which are always present.
pub fn build_payload(step: &StepDefinition, step_index: usize, form: &FormState) -> StepPayload {
    let mut body = Map::new();
    for field in &step.fields {
        if let Some(value) = project_value(&field.transform, form.get(&field.name)) {
            body.insert(field.name.clone(), value);
        }
    }

    StepPayload {
        step_number: step_index + 1,
        kind: step.kind,
        body,
    }
}
