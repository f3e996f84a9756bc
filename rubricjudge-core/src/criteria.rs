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

//! Criteria: named rubrics with a set of allowed verdict options
//!
//! A criterion tells the judge which instance field holds the text being
//! judged (`to_evaluate_field`) and which other fields are shown as context
//! (`context_fields`):
//!
//! - `None` shows every field except the evaluated one
//! - `Some(vec![])` shows no context at all
//! - `Some(names)` shows exactly those fields, all of which must exist

use crate::error::{Result, RubricError};
use crate::instance::{FieldValue, Instance};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Field judged when a criterion does not name one
pub const DEFAULT_EVALUATED_FIELD: &str = "response";

/// One allowed verdict value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionOption {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl CriterionOption {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// A few-shot example attached to a criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionExample {
    pub instance: Instance,
    pub expected_verdict: String,
}

/// A named rubric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub to_evaluate_field: Option<String>,
    #[serde(default)]
    pub context_fields: Option<Vec<String>>,
    #[serde(default)]
    pub options: Vec<CriterionOption>,
    #[serde(default)]
    pub examples: Vec<CriterionExample>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            to_evaluate_field: None,
            context_fields: None,
            options: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Binary Yes/No criterion scoring 1.0 for "Yes" and 0.0 for "No"
    pub fn yes_no(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description)
            .with_option(
                CriterionOption::new("Yes", "The response satisfies the criterion.")
                    .with_score(1.0),
            )
            .with_option(
                CriterionOption::new("No", "The response does not satisfy the criterion.")
                    .with_score(0.0),
            )
    }

    pub fn with_option(mut self, option: CriterionOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_options(mut self, options: Vec<CriterionOption>) -> Self {
        self.options = options;
        self
    }

    pub fn evaluating(mut self, field: impl Into<String>) -> Self {
        self.to_evaluate_field = Some(field.into());
        self
    }

    pub fn with_context_fields(mut self, fields: Vec<String>) -> Self {
        self.context_fields = Some(fields);
        self
    }

    pub fn with_example(mut self, instance: Instance, expected_verdict: impl Into<String>) -> Self {
        self.examples.push(CriterionExample {
            instance,
            expected_verdict: expected_verdict.into(),
        });
        self
    }

    /// Name of the instance field holding the judged text
    pub fn evaluated_field(&self) -> &str {
        self.to_evaluate_field
            .as_deref()
            .unwrap_or(DEFAULT_EVALUATED_FIELD)
    }

    pub fn option_names(&self) -> Vec<String> {
        self.options.iter().map(|o| o.name.clone()).collect()
    }

    pub fn option(&self, name: &str) -> Option<&CriterionOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Declared score of an option, if both the option and its score exist
    pub fn score_of(&self, option_name: &str) -> Option<f64> {
        self.option(option_name).and_then(|o| o.score)
    }

    pub fn has_all_scores(&self) -> bool {
        !self.options.is_empty() && self.options.iter().all(|o| o.score.is_some())
    }

    /// Minimum and maximum declared option scores
    pub fn score_range(&self) -> Option<(f64, f64)> {
        let scores: Vec<f64> = self.options.iter().filter_map(|o| o.score).collect();
        if scores.is_empty() {
            return None;
        }
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Copy of this criterion with the option list reversed
    pub fn reversed_options(&self) -> Self {
        let mut reversed = self.clone();
        reversed.options.reverse();
        reversed
    }

    /// Check option invariants for direct assessment
    pub fn validate(&self) -> Result<()> {
        if self.options.len() < 2 {
            return Err(RubricError::InvalidCriterion {
                criterion: self.name.clone(),
                reason: format!("expected at least 2 options, got {}", self.options.len()),
            });
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if option.name.trim().is_empty() {
                return Err(RubricError::InvalidCriterion {
                    criterion: self.name.clone(),
                    reason: "option names must not be empty".to_string(),
                });
            }
            if !seen.insert(option.name.as_str()) {
                return Err(RubricError::InvalidCriterion {
                    criterion: self.name.clone(),
                    reason: format!("duplicate option name '{}'", option.name),
                });
            }
        }
        Ok(())
    }

    /// The judged value of an instance, or `SchemaMismatch` if absent
    pub fn evaluated_value<'a>(&self, instance: &'a Instance) -> Result<&'a FieldValue> {
        let field = self.evaluated_field();
        instance.get(field).ok_or_else(|| {
            RubricError::SchemaMismatch(format!(
                "instance has no field '{}' required by criterion '{}'",
                field, self.name
            ))
        })
    }

    /// Context fields shown alongside the judged text, in render order
    pub fn resolve_context<'a>(
        &self,
        instance: &'a Instance,
    ) -> Result<Vec<(String, &'a FieldValue)>> {
        let evaluated = self.evaluated_field();
        match &self.context_fields {
            None => Ok(instance
                .fields()
                .filter(|(name, _)| name.as_str() != evaluated)
                .map(|(name, value)| (name.clone(), value))
                .collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    instance
                        .get(name)
                        .map(|value| (name.clone(), value))
                        .ok_or_else(|| {
                            RubricError::SchemaMismatch(format!(
                                "instance has no context field '{}' declared by criterion '{}'",
                                name, self.name
                            ))
                        })
                })
                .collect(),
        }
    }
}
