// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Instances: the unit of text (plus context) being judged

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata key holding caller-supplied system identifiers for pairwise
/// comparison
pub const SYSTEM_NAMES_KEY: &str = "system_names";

/// Value of a single instance field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    /// Several responses, used for pairwise comparison
    List(Vec<String>),
}

impl FieldValue {
    /// Render the value for inclusion in a prompt
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("[{}] {}", i + 1, item))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

/// One unit of text to be judged
///
/// Fields are kept in a sorted map so prompts render deterministically.
/// Instances are built once and never mutated during evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    fields: BTreeMap<String, FieldValue>,

    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Shorthand for an instance holding a single `response` field
    pub fn response(text: impl Into<String>) -> Self {
        Self::new().with_field("response", FieldValue::Text(text.into()))
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// System identifiers declared in metadata, if any
    pub fn system_names(&self) -> Option<Vec<String>> {
        self.metadata.get(SYSTEM_NAMES_KEY)?.as_array().map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_builder() {
        let instance = Instance::response("Buenos Aires is the capital of Argentina")
            .with_field("question", "What is the capital of Argentina?");

        assert!(instance.contains("response"));
        assert_eq!(
            instance.get("question").and_then(|v| v.as_text()),
            Some("What is the capital of Argentina?")
        );
        assert_eq!(instance.fields().count(), 2);
    }

    #[test]
    fn test_field_value_untagged_serde() {
        let text: FieldValue = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, FieldValue::Text("hello".to_string()));

        let list: FieldValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(list.as_list().map(|l| l.len()), Some(2));
        assert_eq!(list.render(), "[1] a\n[2] b");
    }

    #[test]
    fn test_system_names_from_metadata() {
        let instance = Instance::new().with_metadata(
            SYSTEM_NAMES_KEY,
            serde_json::json!(["baseline", "candidate"]),
        );
        assert_eq!(
            instance.system_names(),
            Some(vec!["baseline".to_string(), "candidate".to_string()])
        );
        assert_eq!(Instance::new().system_names(), None);
    }
}
