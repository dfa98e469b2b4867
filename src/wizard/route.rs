//! Deep-link URL contract
//!
//! `/{collection}/{entity_id}/step/{n}?editing=true` or `?mode=view`.
//! A fresh add flow uses `new` in place of the entity id.

use std::fmt;

use reqwest::Url;
use thiserror::Error;

use super::types::{EntityId, WizardMode};

/// Placeholder id segment used before the entity exists
pub const NEW_ENTITY_SEGMENT: &str = "new";

/// Errors while reading a wizard URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("URL '{0}' does not match /{{collection}}/{{id}}/step/{{n}}")]
    NotAStepRoute(String),
    #[error("invalid step number '{0}' (steps are numbered from 1)")]
    InvalidStepNumber(String),
}

/// Parsed wizard location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardRoute {
    /// One or more path segments, e.g. "escrow/accounts"
    pub collection: String,
    pub entity_id: Option<EntityId>,
    /// 1-based step number
    pub step_number: usize,
    pub mode: WizardMode,
}

impl WizardRoute {
    pub fn new(
        collection: impl Into<String>,
        entity_id: Option<EntityId>,
        step_index: usize,
        mode: WizardMode,
    ) -> Self {
        Self {
            collection: collection.into(),
            entity_id,
            step_number: step_index + 1,
            mode,
        }
    }

    /// 0-based index of the step this route points at
    pub fn step_index(&self) -> usize {
        self.step_number.saturating_sub(1)
    }

    /// Parse an absolute URL or a path with optional query
    pub fn parse(input: &str) -> Result<Self, RouteError> {
        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse("http://console.local").and_then(|base| base.join(input))
        }
        .map_err(|_| RouteError::InvalidUrl(input.to_string()))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // [...collection, id, "step", n]
        if segments.len() < 4 || segments[segments.len() - 2] != "step" {
            return Err(RouteError::NotAStepRoute(input.to_string()));
        }

        let raw_step = segments[segments.len() - 1];
        let step_number = raw_step
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| RouteError::InvalidStepNumber(raw_step.to_string()))?;

        let raw_id = segments[segments.len() - 3];
        let entity_id = if raw_id == NEW_ENTITY_SEGMENT {
            None
        } else {
            Some(EntityId::new(raw_id))
        };

        let collection = segments[..segments.len() - 3].join("/");

        let mut view = false;
        let mut editing = false;
        for (key, value) in url.query_pairs() {
            match (key.as_ref(), value.as_ref()) {
                ("mode", "view") => view = true,
                ("editing", "true") => editing = true,
                _ => {}
            }
        }
        let mode = if view {
            WizardMode::View
        } else if editing {
            WizardMode::Edit
        } else {
            WizardMode::Add
        };

        Ok(Self {
            collection,
            entity_id,
            step_number,
            mode,
        })
    }
}

impl fmt::Display for WizardRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .entity_id
            .as_ref()
            .map_or(NEW_ENTITY_SEGMENT, EntityId::as_str);
        write!(f, "/{}/{}/step/{}", self.collection, id, self.step_number)?;
        if let Some((key, value)) = self.mode.query_flag() {
            write!(f, "?{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Listing page of a collection
pub fn listing_path(collection: &str) -> String {
    format!("/{}", collection)
}

/// Where the host should be showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Step(WizardRoute),
    Listing { collection: String },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Step(route) => route.fmt(f),
            Location::Listing { collection } => f.write_str(&listing_path(collection)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit_route() {
        let route = WizardRoute::parse("/escrow-accounts/42/step/2?editing=true").unwrap();
        assert_eq!(route.collection, "escrow-accounts");
        assert_eq!(route.entity_id, Some(EntityId::new("42")));
        assert_eq!(route.step_number, 2);
        assert_eq!(route.step_index(), 1);
        assert_eq!(route.mode, WizardMode::Edit);
    }

    #[test]
    fn test_parse_view_route_from_absolute_url() {
        let route =
            WizardRoute::parse("https://console.example.test/parties/P-9/step/3?mode=view").unwrap();
        assert_eq!(route.collection, "parties");
        assert_eq!(route.mode, WizardMode::View);
        assert_eq!(route.step_number, 3);
    }

    #[test]
    fn test_missing_flags_mean_add() {
        let route = WizardRoute::parse("/fees/new/step/1").unwrap();
        assert_eq!(route.mode, WizardMode::Add);
        assert_eq!(route.entity_id, None);
    }

    #[test]
    fn test_nested_collection() {
        let route = WizardRoute::parse("/master-data/business-segments/7/step/1?mode=view").unwrap();
        assert_eq!(route.collection, "master-data/business-segments");
        assert_eq!(
            route.to_string(),
            "/master-data/business-segments/7/step/1?mode=view"
        );
    }

    #[test]
    fn test_invalid_step_numbers() {
        assert_eq!(
            WizardRoute::parse("/fees/1/step/0"),
            Err(RouteError::InvalidStepNumber("0".to_string()))
        );
        assert_eq!(
            WizardRoute::parse("/fees/1/step/two"),
            Err(RouteError::InvalidStepNumber("two".to_string()))
        );
    }

    #[test]
    fn test_not_a_step_route() {
        assert!(matches!(
            WizardRoute::parse("/fees/1"),
            Err(RouteError::NotAStepRoute(_))
        ));
        assert!(matches!(
            WizardRoute::parse("/1/step/2"),
            Err(RouteError::NotAStepRoute(_))
        ));
    }

    #[test]
    fn test_display_round_trips() {
        let route = WizardRoute::new("entities", Some(EntityId::new("42")), 1, WizardMode::Edit);
        assert_eq!(route.to_string(), "/entities/42/step/2?editing=true");
        assert_eq!(WizardRoute::parse(&route.to_string()).unwrap(), route);

        let fresh = WizardRoute::new("entities", None, 0, WizardMode::Add);
        assert_eq!(fresh.to_string(), "/entities/new/step/1");
    }

    #[test]
    fn test_listing_location() {
        let location = Location::Listing {
            collection: "fees".to_string(),
        };
        assert_eq!(location.to_string(), "/fees");
    }
}
