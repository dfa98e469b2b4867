//! Client-side router seam

use std::sync::{Mutex, PoisonError};

use super::route::Location;

/// Receives every location change the engine makes
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &Location);
}

/// In-memory history used by the CLI and tests
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    entries: Mutex<Vec<Location>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Location> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn history(&self) -> Vec<Location> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, location: &Location) {
        tracing::debug!(%location, "navigate");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_records_in_order() {
        let nav = HistoryNavigator::new();
        assert!(nav.current().is_none());

        nav.navigate(&Location::Listing {
            collection: "fees".to_string(),
        });
        nav.navigate(&Location::Listing {
            collection: "parties".to_string(),
        });

        assert_eq!(nav.history().len(), 2);
        assert_eq!(nav.current().unwrap().to_string(), "/parties");
    }
}
