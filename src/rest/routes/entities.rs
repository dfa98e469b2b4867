//! Step persistence endpoints.
//!
//! Collections may span several path segments, so these handlers sit behind a
//! wildcard route and split the tail themselves:
//!
//! - `POST {collection}/steps/{n}` creates the entity from step `n`
//! - `POST {collection}/steps/{n}/validate` checks step data without saving
//! - `PUT {collection}/{id}/steps/{n}` saves step `n` of an existing entity
//! - `GET {collection}/{id}` returns the entity

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::flows::FlowDefinition;
use crate::rest::dto::{CreatedResponse, EntityResponse, IdBody};
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;
use crate::wizard::{RuleValidator, StepDefinition, ValidationOutcome, ValidationReport};

#[derive(Debug, PartialEq, Eq)]
enum PostTarget {
    Create { collection: String, step_number: usize },
    Validate { collection: String, step_number: usize },
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_step_number(raw: &str) -> Result<usize, ApiError> {
    raw.parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid step number '{}'", raw)))
}

fn no_route(method: &str, path: &str) -> ApiError {
    ApiError::NotFound(format!("No route for {} /api/v1/{}", method, path))
}

fn parse_post(path: &str) -> Result<PostTarget, ApiError> {
    let segs = segments(path);
    let len = segs.len();
    if len >= 4 && segs[len - 1] == "validate" && segs[len - 3] == "steps" {
        return Ok(PostTarget::Validate {
            collection: segs[..len - 3].join("/"),
            step_number: parse_step_number(segs[len - 2])?,
        });
    }
    if len >= 3 && segs[len - 2] == "steps" {
        return Ok(PostTarget::Create {
            collection: segs[..len - 2].join("/"),
            step_number: parse_step_number(segs[len - 1])?,
        });
    }
    Err(no_route("POST", path))
}

/// `(collection, id, step_number)`
fn parse_put(path: &str) -> Result<(String, String, usize), ApiError> {
    let segs = segments(path);
    let len = segs.len();
    if len >= 4 && segs[len - 2] == "steps" {
        return Ok((
            segs[..len - 3].join("/"),
            segs[len - 3].to_string(),
            parse_step_number(segs[len - 1])?,
        ));
    }
    Err(no_route("PUT", path))
}

/// `(collection, id)`
fn parse_get(path: &str) -> Result<(String, String), ApiError> {
    let segs = segments(path);
    let len = segs.len();
    if len >= 2 {
        return Ok((segs[..len - 1].join("/"), segs[len - 1].to_string()));
    }
    Err(no_route("GET", path))
}

fn resolve<'a>(state: &'a ApiState, collection: &str) -> Result<&'a FlowDefinition, ApiError> {
    state
        .flows
        .by_collection(collection)
        .ok_or_else(|| ApiError::NotFound(format!("Collection '{}' not found", collection)))
}

fn step_at(flow: &FlowDefinition, step_number: usize) -> Result<&StepDefinition, ApiError> {
    flow.steps.get(step_number - 1).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Step {} is out of range ({} has {} steps)",
            step_number,
            flow.key,
            flow.steps.len()
        ))
    })
}

/// Re-run the field rules; clients are not trusted to have done it
fn check(step: &StepDefinition, body: &Map<String, Value>) -> Result<(), ApiError> {
    match RuleValidator::new().validate_sync(step, body) {
        ValidationOutcome::Valid => Ok(()),
        invalid => Err(ApiError::ValidationError(
            invalid.summary().unwrap_or_default(),
        )),
    }
}

/// POST: create from a step, or validate a step
pub async fn post(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Response, ApiError> {
    match parse_post(&path)? {
        PostTarget::Validate {
            collection,
            step_number,
        } => {
            let flow = resolve(&state, &collection)?;
            let step = step_at(flow, step_number)?;
            let outcome = RuleValidator::new().validate_sync(step, &body);
            debug!(%collection, step = step_number, valid = outcome.is_valid(), "validated step");
            Ok(Json(ValidationReport::from(&outcome)).into_response())
        }
        PostTarget::Create {
            collection,
            step_number,
        } => {
            let flow = resolve(&state, &collection)?;
            let step = step_at(flow, step_number)?;
            if step_number != 1 {
                return Err(ApiError::BadRequest(format!(
                    "Entity ID is required to save step {}",
                    step_number
                )));
            }
            check(step, &body)?;

            let mut store = state.store.write().await;
            let entity = store.create(&collection, body, step_number);
            info!(%collection, id = %entity.id, "entity created");

            Ok((
                StatusCode::CREATED,
                Json(CreatedResponse {
                    data: IdBody {
                        id: entity.id.clone(),
                    },
                }),
            )
                .into_response())
        }
    }
}

/// PUT: save a step of an existing entity
pub async fn update(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<IdBody>, ApiError> {
    let (collection, id, step_number) = parse_put(&path)?;
    let flow = resolve(&state, &collection)?;
    let step = step_at(flow, step_number)?;
    check(step, &body)?;

    let mut store = state.store.write().await;
    let entity = store
        .update(&collection, &id, body, step_number)
        .ok_or_else(|| ApiError::NotFound(format!("Entity '{}' not found in {}", id, collection)))?;
    debug!(%collection, %id, step = step_number, "entity updated");

    Ok(Json(IdBody {
        id: entity.id.clone(),
    }))
}

/// GET: current state of an entity
pub async fn fetch(
    State(state): State<ApiState>,
    Path(path): Path<String>,
) -> Result<Json<EntityResponse>, ApiError> {
    let (collection, id) = parse_get(&path)?;
    resolve(&state, &collection)?;

    let store = state.store.read().await;
    let entity = store
        .get(&collection, &id)
        .ok_or_else(|| ApiError::NotFound(format!("Entity '{}' not found in {}", id, collection)))?;

    Ok(Json(EntityResponse::from(entity)))
}
