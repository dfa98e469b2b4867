//! Flow registry
//!
//! Every entity wizard in the console is a [`FlowDefinition`]: builtins are
//! embedded in the binary, and JSON/YAML/TOML files in the configured flows
//! directory add new entities or override a builtin by key.

pub mod loader;
pub mod schema;

pub use schema::{FlowDefinition, FlowError, FlowSource};

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

/// Central registry of flow definitions
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: BTreeMap<String, FlowDefinition>,
}

impl FlowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtins plus any user flows found in `user_dir`
    pub fn load(user_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_builtins()?;
        registry.load_user_flows(user_dir)?;
        Ok(registry)
    }

    pub fn load_builtins(&mut self) -> Result<()> {
        let builtins = loader::load_builtins()?;
        self.flows.extend(builtins);
        info!("Loaded {} builtin flows", self.flows.len());
        Ok(())
    }

    pub fn load_user_flows(&mut self, path: &Path) -> Result<()> {
        let user_flows = loader::load_user_flows(path)?;
        let count = user_flows.len();

        for (key, flow) in user_flows {
            if self.flows.contains_key(&key) {
                debug!("User flow '{}' overrides builtin", key);
            }
            self.register(flow)?;
        }

        if count > 0 {
            info!("Loaded {} user-defined flows", count);
        }
        Ok(())
    }

    /// Register a flow after validating it
    pub fn register(&mut self, flow: FlowDefinition) -> Result<()> {
        flow.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("Validation errors: {}", msgs.join("; "))
        })?;

        debug!("Registered flow: {}", flow.key);
        self.flows.insert(flow.key.clone(), flow);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FlowDefinition> {
        self.flows.get(key)
    }

    /// Flow serving a route collection
    pub fn by_collection(&self, collection: &str) -> Option<&FlowDefinition> {
        self.flows.values().find(|f| f.collection == collection)
    }

    /// All flows, ordered by key
    pub fn all(&self) -> impl Iterator<Item = &FlowDefinition> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_with_user_override() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("fee.yaml"),
            r#"
key: fee
name: Fee (simplified)
collection: fees
reference_type: FEE
module_name: masterdata
action_key: CREATE_FEE
steps:
  - label: Details
    fields:
      - name: name
  - label: Review
    kind: review
    skip_validation: true
"#,
        )
        .unwrap();

        let registry = FlowRegistry::load(temp_dir.path()).unwrap();
        assert_eq!(registry.len(), 5);
        let fee = registry.get("fee").unwrap();
        assert_eq!(fee.name, "Fee (simplified)");
        assert_eq!(fee.source, FlowSource::User);
        assert_eq!(registry.get("party").unwrap().source, FlowSource::Builtin);
    }

    #[test]
    fn test_by_collection() {
        let mut registry = FlowRegistry::new();
        registry.load_builtins().unwrap();
        assert_eq!(
            registry.by_collection("escrow-accounts").unwrap().key,
            "escrow_account"
        );
        assert!(registry.by_collection("unknown").is_none());
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut registry = FlowRegistry::new();
        let flow = FlowDefinition {
            key: String::new(),
            name: "Nameless".to_string(),
            description: String::new(),
            collection: "things".to_string(),
            reference_type: "THING".to_string(),
            module_name: "masterdata".to_string(),
            action_key: "CREATE_THING".to_string(),
            steps: vec![],
            source: FlowSource::User,
        };
        let err = registry.register(flow).unwrap_err();
        assert!(err.to_string().contains("flow key must not be empty"));
        assert!(registry.is_empty());
    }
}
