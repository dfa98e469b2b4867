//! Filesystem loading for flow definitions

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::schema::{FlowDefinition, FlowSource};

/// Embedded definitions shipped with the binary
const BUILTIN_FLOWS: &[(&str, &str)] = &[
    ("party", include_str!("builtin/party.json")),
    ("escrow_account", include_str!("builtin/escrow_account.json")),
    ("fee", include_str!("builtin/fee.json")),
    ("deal_parameter", include_str!("builtin/deal_parameter.json")),
    (
        "payment_instruction",
        include_str!("builtin/payment_instruction.json"),
    ),
];

/// Load all built-in flows
pub fn load_builtins() -> Result<HashMap<String, FlowDefinition>> {
    let mut flows = HashMap::new();

    for (name, json) in BUILTIN_FLOWS {
        match parse_flow(json, Format::Json) {
            Ok(mut flow) => {
                flow.source = FlowSource::Builtin;
                debug!("Loaded builtin flow: {}", flow.key);
                flows.insert(flow.key.clone(), flow);
            }
            Err(e) => {
                warn!("Failed to parse builtin flow {}: {:#}", name, e);
            }
        }
    }

    Ok(flows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

fn parse_flow(content: &str, format: Format) -> Result<FlowDefinition> {
    let flow: FlowDefinition = match format {
        Format::Json => serde_json::from_str(content).context("Failed to parse JSON")?,
        Format::Yaml => serde_yaml::from_str(content).context("Failed to parse YAML")?,
        Format::Toml => toml::from_str(content).context("Failed to parse TOML")?,
    };

    if let Err(errors) = flow.validate() {
        let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Validation errors: {}", error_msgs.join("; "));
    }

    Ok(flow)
}

/// Load a single flow definition from a JSON, YAML or TOML file
pub fn load_flow_file(path: &Path) -> Result<FlowDefinition> {
    let format = Format::from_path(path)
        .with_context(|| format!("Unsupported flow file type: {}", path.display()))?;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_flow(&content, format).with_context(|| format!("Invalid flow: {}", path.display()))
}

/// Load user-defined flows from a directory
///
/// Invalid files are logged as warnings and skipped.
pub fn load_user_flows(path: &Path) -> Result<HashMap<String, FlowDefinition>> {
    let mut flows = HashMap::new();

    if !path.exists() {
        debug!("User flows directory does not exist: {}", path.display());
        return Ok(flows);
    }

    let entries = fs::read_dir(path)
        .with_context(|| format!("Failed to read flows directory: {}", path.display()))?;

    for entry in entries {
        let file_path = entry?.path();

        if file_path.is_dir() || Format::from_path(&file_path).is_none() {
            continue;
        }

        match load_flow_file(&file_path) {
            Ok(mut flow) => {
                flow.source = FlowSource::User;
                debug!(
                    "Loaded user flow: {} from {}",
                    flow.key,
                    file_path.display()
                );
                flows.insert(flow.key.clone(), flow);
            }
            Err(e) => {
                warn!("Skipping flow file {}: {:#}", file_path.display(), e);
            }
        }
    }

    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_builtins() {
        let flows = load_builtins().unwrap();
        assert_eq!(flows.len(), BUILTIN_FLOWS.len());
        for key in [
            "party",
            "escrow_account",
            "fee",
            "deal_parameter",
            "payment_instruction",
        ] {
            let flow = flows.get(key).unwrap();
            assert_eq!(flow.source, FlowSource::Builtin);
            assert!(flow.validate().is_ok(), "{} should be valid", key);
        }
    }

    #[test]
    fn test_load_user_flows_nonexistent_dir() {
        let flows = load_user_flows(Path::new("/nonexistent/path")).unwrap();
        assert!(flows.is_empty());
    }

    #[test]
    fn test_load_user_flows_all_formats() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("account_purpose.json"),
            r#"{
                "key": "account_purpose",
                "name": "Account purpose",
                "collection": "account-purposes",
                "reference_type": "ACCOUNT_PURPOSE",
                "module_name": "masterdata",
                "action_key": "CREATE_ACCOUNT_PURPOSE",
                "steps": [
                    {"label": "Details", "fields": [{"name": "name", "rules": {"required": true}}]},
                    {"label": "Review", "kind": "review", "skip_validation": true}
                ]
            }"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("segment.yaml"),
            r#"
key: business_segment
name: Business segment
collection: master-data/business-segments
reference_type: BUSINESS_SEGMENT
module_name: masterdata
action_key: CREATE_BUSINESS_SEGMENT
steps:
  - label: Details
    fields:
      - name: name
        rules:
          required: true
  - label: Review
    kind: review
    skip_validation: true
"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("agreement.toml"),
            r#"
key = "agreement_parameter"
name = "Agreement parameter"
collection = "agreement-parameters"
reference_type = "AGREEMENT_PARAMETER"
module_name = "deals"
action_key = "CREATE_AGREEMENT_PARAMETER"

[[steps]]
label = "Details"

[[steps.fields]]
name = "name"
rules = { required = true }

[[steps]]
label = "Review"
kind = "review"
skip_validation = true
"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "not a flow").unwrap();

        let flows = load_user_flows(temp_dir.path()).unwrap();
        assert_eq!(flows.len(), 3);
        assert_eq!(
            flows["business_segment"].collection,
            "master-data/business-segments"
        );
        assert_eq!(flows["agreement_parameter"].steps.len(), 2);
        assert_eq!(flows["account_purpose"].source, FlowSource::User);
    }

    #[test]
    fn test_load_user_flows_skips_invalid() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("broken.json"),
            r#"{
                "key": "broken",
                "name": "Broken",
                "collection": "broken",
                "reference_type": "BROKEN",
                "module_name": "masterdata",
                "action_key": "CREATE_BROKEN",
                "steps": []
            }"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("garbage.json"), "{ not json").unwrap();

        let flows = load_user_flows(temp_dir.path()).unwrap();
        assert!(flows.is_empty());
    }

    #[test]
    fn test_load_flow_file_rejects_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("flow.ini");
        fs::write(&path, "").unwrap();
        let err = load_flow_file(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported flow file type"));
    }
}
