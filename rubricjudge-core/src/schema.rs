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

//! Record schemas for structured model output
//!
//! A [`RecordSchema`] is used both to tell a model what to produce (rendered
//! as JSON Schema plus plain-language instructions) and to validate what it
//! actually produced. Fallback placeholders are built from an explicit
//! per-kind default table rather than by reflection.

use crate::criteria::Criterion;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A validated model output
pub type Record = Map<String, Value>;

/// Field name of the chosen option in direct results
pub const SELECTED_OPTION_FIELD: &str = "selected_option";
/// Field name of the winning position in pairwise results
pub const WINNER_FIELD: &str = "winner";
pub const EXPLANATION_FIELD: &str = "explanation";
pub const FEEDBACK_FIELD: &str = "feedback";

/// Type of a single record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    /// A string restricted to the listed values
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &str, description: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, description, kind)
        }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match (&self.kind, value) {
            (FieldKind::Text, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Choice(allowed), Value::String(s)) => {
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!(
                        "field '{}' has value {:?}, expected one of {:?}",
                        self.name, s, allowed
                    ));
                }
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "field '{}' has the wrong type: expected {}, got {}",
                self.name,
                self.kind.type_name(),
                value
            ))
        }
    }

    fn placeholder(&self) -> Value {
        match self.kind {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Number | FieldKind::Choice(_) => Value::Null,
        }
    }
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Choice(_) => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }
}

/// Machine-readable description of a target record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Strictly validate a parsed value
    ///
    /// Unknown fields are dropped, absent optional fields become null.
    pub fn validate(&self, value: &Value) -> Result<Record, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object for {}, got {}", self.name, value))?;

        let mut record = Record::new();
        for field in &self.fields {
            match object.get(&field.name) {
                Some(Value::Null) | None if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                Some(Value::Null) | None => {
                    record.insert(field.name.clone(), Value::Null);
                }
                Some(v) => {
                    field.check(v)?;
                    record.insert(field.name.clone(), v.clone());
                }
            }
        }
        Ok(record)
    }

    /// Parse raw text as JSON and validate it
    pub fn parse(&self, text: &str) -> Result<Record, String> {
        let value: Value = serde_json::from_str(text.trim()).map_err(|e| e.to_string())?;
        self.validate(&value)
    }

    /// JSON Schema rendering of this record type
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut property = json!({
                "type": field.kind.type_name(),
                "description": field.description,
            });
            if let FieldKind::Choice(values) = &field.kind {
                property["enum"] = json!(values);
            }
            if !field.required {
                property["type"] = json!([field.kind.type_name(), "null"]);
            } else {
                required.push(field.name.clone());
            }
            properties.insert(field.name.clone(), property);
        }

        json!({
            "title": self.name,
            "description": self.description,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Output-format block embedded in prompts
    pub fn format_instructions(&self) -> String {
        let mut out = String::from(
            "Respond with a single JSON object and nothing else. It must have these fields:\n",
        );
        for field in &self.fields {
            let kind = match &field.kind {
                FieldKind::Choice(values) => format!(
                    "one of {}",
                    values
                        .iter()
                        .map(|v| format!("\"{}\"", v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                other => other.type_name().to_string(),
            };
            out.push_str(&format!(
                "- \"{}\" ({}{}): {}\n",
                field.name,
                kind,
                if field.required { "" } else { ", optional" },
                field.description
            ));
        }
        out.push_str("\nJSON schema:\n");
        out.push_str(&self.to_json_schema().to_string());
        out
    }

    /// Placeholder record for a generation that could not be repaired
    ///
    /// Override values win over the default table. A list-valued override is
    /// resolved by choosing one element uniformly at random.
    pub fn default_record<R: Rng + ?Sized>(&self, overrides: Option<&Record>, rng: &mut R) -> Record {
        let mut record = Record::new();
        for field in &self.fields {
            let value = match overrides.and_then(|o| o.get(&field.name)) {
                Some(Value::Array(choices)) => choices
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| field.placeholder()),
                Some(value) => value.clone(),
                None => field.placeholder(),
            };
            record.insert(field.name.clone(), value);
        }
        record
    }
}

/// Schema of a direct-assessment verdict for one criterion
pub fn direct_result_schema(criterion: &Criterion) -> RecordSchema {
    RecordSchema::new(
        "DirectAssessmentResult",
        format!("Verdict for the criterion '{}'", criterion.name),
    )
    .with_field(FieldSpec::required(
        EXPLANATION_FIELD,
        "Step-by-step reasoning that leads to the selected option",
        FieldKind::Text,
    ))
    .with_field(FieldSpec::required(
        SELECTED_OPTION_FIELD,
        "Name of the option that best describes the evaluated text",
        FieldKind::Choice(criterion.option_names()),
    ))
    .with_field(FieldSpec::optional(
        FEEDBACK_FIELD,
        "Concrete suggestions to improve the evaluated text",
        FieldKind::Text,
    ))
}

/// Schema of a pairwise verdict between the two presented responses
pub fn pairwise_result_schema() -> RecordSchema {
    RecordSchema::new(
        "PairwiseComparisonResult",
        "Which of the two presented responses better satisfies the criterion",
    )
    .with_field(FieldSpec::required(
        EXPLANATION_FIELD,
        "Step-by-step comparison of both responses against the criterion",
        FieldKind::Text,
    ))
    .with_field(FieldSpec::required(
        WINNER_FIELD,
        "\"1\" if Response 1 is better, \"2\" if Response 2 is better",
        FieldKind::Choice(vec!["1".to_string(), "2".to_string()]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriterionOption;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn schema() -> RecordSchema {
        direct_result_schema(
            &Criterion::new("accuracy", "")
                .with_option(CriterionOption::new("Good", ""))
                .with_option(CriterionOption::new("Bad", "")),
        )
    }

    #[test]
    fn test_validate_accepts_valid_record() {
        let record = schema()
            .parse(r#"{"selected_option": "Good", "explanation": "Correct.", "extra": 1}"#)
            .unwrap();
        assert_eq!(record["selected_option"], "Good");
        assert_eq!(record["feedback"], Value::Null);
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn test_validate_rejects_unknown_choice() {
        let err = schema()
            .parse(r#"{"selected_option": "Maybe", "explanation": "?"}"#)
            .unwrap_err();
        assert!(err.contains("Maybe"));
    }

    #[test]
    fn test_validate_rejects_missing_and_mistyped() {
        assert!(schema().parse(r#"{"selected_option": "Good"}"#).is_err());
        assert!(schema()
            .parse(r#"{"selected_option": "Good", "explanation": 4}"#)
            .is_err());
        assert!(schema().parse("[1, 2]").is_err());
    }

    #[test]
    fn test_default_record_uses_overrides() {
        let mut overrides = Record::new();
        overrides.insert("selected_option".to_string(), json!(["Good", "Bad"]));
        let mut rng = StdRng::seed_from_u64(7);

        let record = schema().default_record(Some(&overrides), &mut rng);
        let selected = record["selected_option"].as_str().unwrap();
        assert!(selected == "Good" || selected == "Bad");
        assert_eq!(record["explanation"], "");
        assert_eq!(record["feedback"], "");
    }

    #[test]
    fn test_format_instructions_list_choices() {
        let text = schema().format_instructions();
        assert!(text.contains("one of \"Good\", \"Bad\""));
        assert!(text.contains("\"required\""));
    }

    #[test]
    fn test_record_round_trip() {
        let record = schema()
            .parse(r#"{"selected_option": "Bad", "explanation": "Wrong \"capital\"\n"}"#)
            .unwrap();
        let reparsed = schema()
            .parse(&serde_json::to_string(&record).unwrap())
            .unwrap();
        assert_eq!(record, reparsed);
    }
}
