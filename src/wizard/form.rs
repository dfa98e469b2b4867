//! Shared form record for every step of a wizard

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

/// Field values across all steps plus which of them the user has touched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    values: Map<String, Value>,
    #[serde(skip)]
    dirty: BTreeSet<String>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the form without marking anything as user-modified
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            dirty: BTreeSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Record a user edit
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.dirty.insert(name.clone());
        self.values.insert(name, value);
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Merge server data, leaving user-modified fields alone.
    /// Returns the number of fields written.
    pub fn merge_server(&mut self, server: &Map<String, Value>) -> usize {
        let mut written = 0;
        for (name, value) in server {
            if self.dirty.contains(name) {
                continue;
            }
            if self.values.get(name) != Some(value) {
                self.values.insert(name.clone(), value.clone());
                written += 1;
            }
        }
        written
    }

    /// Copy of the values belonging to `fields`
    pub fn restrict(&self, fields: &[&str]) -> Map<String, Value> {
        fields
            .iter()
            .filter_map(|name| {
                self.values
                    .get(*name)
                    .map(|value| ((*name).to_string(), value.clone()))
            })
            .collect()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_marks_dirty() {
        let mut form = FormState::new();
        form.set("name", json!("Acme"));
        assert!(form.is_dirty("name"));
        assert_eq!(form.get("name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_merge_keeps_user_edits() {
        let mut form = FormState::new();
        form.set("name", json!("Typed by user"));

        let written = form.merge_server(&server(json!({
            "name": "From server",
            "currency": "EUR"
        })));

        assert_eq!(written, 1);
        assert_eq!(form.get("name"), Some(&json!("Typed by user")));
        assert_eq!(form.get("currency"), Some(&json!("EUR")));
        assert!(!form.is_dirty("currency"));
    }

    #[test]
    fn test_merge_of_identical_data_writes_nothing() {
        let mut form = FormState::from_values(server(json!({"name": "Acme"})));
        assert_eq!(form.merge_server(&server(json!({"name": "Acme"}))), 0);
    }

    #[test]
    fn test_restrict_returns_only_requested_fields() {
        let form = FormState::from_values(server(json!({
            "name": "Acme",
            "iban": "DE89370400440532013000",
            "fee": 12
        })));

        let subset = form.restrict(&["name", "fee", "missing"]);
        assert_eq!(subset.len(), 2);
        assert!(subset.contains_key("name"));
        assert!(subset.contains_key("fee"));
    }

    #[test]
    fn test_clear_dirty_allows_server_overwrite() {
        let mut form = FormState::new();
        form.set("name", json!("draft"));
        form.clear_dirty();
        form.merge_server(&server(json!({"name": "saved"})));
        assert_eq!(form.get("name"), Some(&json!("saved")));
    }
}
