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

//! Multi-criteria aggregation
//!
//! Reduces per-criterion direct results into one score:
//!
//! ```text
//! aggregated = Σ effective_weight(item) * item_score(item)
//! aggregated = 0.0 if any required item scores below 1.0
//! ```

use crate::error::{Result, RubricError};
use crate::multi_criteria::{AggregationPolicy, MultiCriteria, MultiCriteriaItem};
use crate::results::{DirectInstanceResult, MultiCriteriaDirectInstanceResult};
use std::collections::BTreeMap;
use tracing::debug;

impl MultiCriteria {
    /// Aggregate one result per declared criterion
    ///
    /// Results are matched to items by criterion name. A missing result is a
    /// hard error even when an earlier required item already failed.
    pub fn get_result(
        &self,
        per_criterion_results: &[DirectInstanceResult],
    ) -> Result<MultiCriteriaDirectInstanceResult> {
        let mut ordered = Vec::with_capacity(self.items().len());
        for item in self.items() {
            let result = per_criterion_results
                .iter()
                .find(|r| r.criterion.name == item.name())
                .ok_or_else(|| RubricError::MissingCriterionResult(item.name().to_string()))?;
            ordered.push(result.clone());
        }

        let mut per_criterion_score = BTreeMap::new();
        let mut total = 0.0;
        let mut failed_required = None;

        for (item, result) in self.items().iter().zip(&ordered) {
            let score = self.item_score(item, result);
            let contribution = self.effective_weight(item) * score;
            per_criterion_score.insert(item.name().to_string(), contribution);
            total += contribution;

            if item.required && score < 1.0 && failed_required.is_none() {
                debug!(
                    "Required criterion '{}' scored {:.3}; aggregated score forced to 0",
                    item.name(),
                    score
                );
                failed_required = Some(item.name().to_string());
            }
        }

        let aggregated_score = if failed_required.is_some() { 0.0 } else { total };

        Ok(MultiCriteriaDirectInstanceResult {
            multi_criteria: self.clone(),
            per_criterion_results: ordered,
            per_criterion_score,
            aggregated_score,
            failed_required,
        })
    }

    /// Numeric score of one item's result, before weighting
    pub fn item_score(&self, item: &MultiCriteriaItem, result: &DirectInstanceResult) -> f64 {
        match item.policy() {
            AggregationPolicy::TargetOption(target) => {
                if result.selected_option == target {
                    1.0
                } else {
                    0.0
                }
            }
            AggregationPolicy::ScoreThreshold(threshold) => match result.score {
                Some(score) if score > threshold => 1.0,
                _ => 0.0,
            },
            AggregationPolicy::Weighted(_) => {
                let raw = item
                    .criterion
                    .score_of(&result.selected_option)
                    .or(result.score)
                    .unwrap_or(0.0);
                if item.normalize_scores {
                    normalize(raw, item.criterion.score_range())
                } else {
                    raw
                }
            }
        }
    }
}

/// Linear rescale into [0, 1] using the criterion's declared score range.
/// Computed per call from the definition, which is never mutated.
fn normalize(raw: f64, range: Option<(f64, f64)>) -> f64 {
    match range {
        Some((min, max)) if max > min => ((raw - min) / (max - min)).clamp(0.0, 1.0),
        _ => raw.clamp(0.0, 1.0),
    }
}
