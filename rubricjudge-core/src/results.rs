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

//! Judgment result records
//!
//! All results are plain value objects owned by the caller. They hold no
//! reference back to the inference engine that produced them.

use crate::criteria::Criterion;
use crate::multi_criteria::MultiCriteria;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata key set to `true` when a record is a fallback placeholder
pub const GENERATION_FAILED_KEY: &str = "generation_failed";

/// Outcome of the option-order reversal check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionalBias {
    pub detected: bool,

    /// Result of the reversed-order pass, attached only when detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_result: Option<Box<DirectInstanceResult>>,
}

/// Verdict for one (instance, criterion) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectInstanceResult {
    pub criterion: Criterion,
    pub selected_option: String,
    pub score: Option<f64>,
    pub explanation: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub positional_bias: PositionalBias,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DirectInstanceResult {
    /// Whether this record is a placeholder produced by the fallback policy.
    /// Callers must check this before trusting the content.
    pub fn generation_failed(&self) -> bool {
        self.metadata
            .get(GENERATION_FAILED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Per-system outcome of a pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleSystemPairwiseResult {
    /// One entry per opponent: did this system win the contest
    pub contest_results: Vec<bool>,
    /// Opponent indices, aligned with `contest_results`
    pub compared_to: Vec<usize>,
    pub explanations: Vec<String>,
    /// Whether the two orderings disagreed, per contest
    pub positional_bias: Option<Vec<bool>>,
    /// Both orderings of the contest fell back to placeholders. Such
    /// contests are left out of `winrate`.
    #[serde(default)]
    pub generation_failed: Vec<bool>,
    pub winrate: f64,
    /// 1-based rank by winrate
    pub ranking: usize,
    /// Identifier of the winner, per contest
    pub selections: Vec<String>,
}

/// Pairwise outcome keyed by system identifier
pub type PairwiseInstanceResult = BTreeMap<String, SingleSystemPairwiseResult>;

/// Aggregated verdict of a multi-criteria evaluation. Produced by
/// [`MultiCriteria::get_result`]; never constructed by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiCriteriaDirectInstanceResult {
    pub multi_criteria: MultiCriteria,
    pub per_criterion_results: Vec<DirectInstanceResult>,
    /// Weighted contribution of each criterion to the total
    pub per_criterion_score: BTreeMap<String, f64>,
    pub aggregated_score: f64,
    /// Name of the required criterion that zeroed the total, if any
    #[serde(default)]
    pub failed_required: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriterionOption;

    #[test]
    fn test_generation_failed_flag() {
        let mut result = DirectInstanceResult {
            criterion: Criterion::new("clarity", "Is it clear?")
                .with_option(CriterionOption::new("Yes", ""))
                .with_option(CriterionOption::new("No", "")),
            selected_option: "Yes".to_string(),
            score: None,
            explanation: String::new(),
            feedback: None,
            positional_bias: PositionalBias::default(),
            metadata: HashMap::new(),
        };
        assert!(!result.generation_failed());

        result
            .metadata
            .insert(GENERATION_FAILED_KEY.to_string(), serde_json::json!(true));
        assert!(result.generation_failed());
    }

    #[test]
    fn test_positional_bias_omits_absent_alternate() {
        let json = serde_json::to_value(PositionalBias::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "detected": false }));
    }
}
